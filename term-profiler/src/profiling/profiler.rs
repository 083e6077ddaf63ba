//! Pluggable profilers and the statistical profiler.

use async_trait::async_trait;
use datafusion::prelude::SessionContext;
use tracing::instrument;

use super::config::ProfilerConfig;
use super::consumer::ProfilingStreamConsumer;
use super::engine::SqlMeasureEngine;
use super::measures::{MeasureCatalog, MeasureCatalogBuilder, StreamSchema};
use super::scorer::AnomalyScorer;
use super::sink::ReportSink;
use super::snapshot::Snapshot;
use crate::error::{ProfilerError, ProfilerResult};
use crate::log_catalog;
use crate::logging::LogConfig;

/// A profiler that can be attached to a profiling pipeline.
///
/// A profiler first derives the measures it needs from the stream's schema,
/// then consumes the snapshots of those measures the engine emits.
#[async_trait]
pub trait AutoProfiler: Send + Sync {
    /// Derives the measures to compute for a schema.
    fn set_measures(&mut self, schema: &StreamSchema) -> MeasureCatalog;

    /// Consumes one snapshot of measure values, returning its anomaly score.
    async fn consume_measures(&mut self, snapshot: Snapshot) -> ProfilerResult<f64>;

    /// Returns the name of this profiler.
    fn name(&self) -> &str;
}

/// Profiles numeric columns with rolling-mean anomaly scoring.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use arrow::datatypes::{DataType, Field, Schema};
/// use term_profiler::profiling::{AutoProfiler, ProfilerConfig, Snapshot, StatisticalProfiler, StreamSchema};
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let schema = Arc::new(Schema::new(vec![
///     Field::new("ts", DataType::Int64, false),
///     Field::new("host", DataType::Utf8, false),
///     Field::new("latency", DataType::Float64, true),
/// ]));
///
/// let mut profiler = StatisticalProfiler::new(ProfilerConfig::default())?;
/// let catalog = profiler.set_measures(&StreamSchema::new(schema, "ts", "host"));
/// assert_eq!(catalog.len(), 6);
///
/// let snapshot: Snapshot = [("latency_mean_prof", 12.5)].into_iter().collect();
/// let score = profiler.consume_measures(snapshot).await?;
/// assert_eq!(score, 0.0);
/// # Ok::<(), term_profiler::ProfilerError>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct StatisticalProfiler {
    builder: MeasureCatalogBuilder,
    catalog: Option<(StreamSchema, MeasureCatalog)>,
    consumer: ProfilingStreamConsumer,
    log_config: LogConfig,
}

impl StatisticalProfiler {
    /// Creates a profiler with empty history.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ProfilerConfig) -> ProfilerResult<Self> {
        let consumer = ProfilingStreamConsumer::new(&config)?;
        Ok(Self {
            builder: MeasureCatalogBuilder::from_config(&config),
            catalog: None,
            consumer,
            log_config: LogConfig::default(),
        })
    }

    /// Adds a reporting sink.
    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.consumer = self.consumer.with_sink(sink);
        self
    }

    /// Replaces the anomaly scorer.
    pub fn with_scorer(mut self, scorer: impl AnomalyScorer + 'static) -> Self {
        self.consumer = self.consumer.with_scorer(scorer);
        self
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.consumer = self.consumer.with_log_config(log_config.clone());
        self.log_config = log_config;
        self
    }

    /// The current catalog, if measures were set.
    pub fn catalog(&self) -> Option<&MeasureCatalog> {
        self.catalog.as_ref().map(|(_, catalog)| catalog)
    }

    /// Measures per numeric column of the current catalog, 0 if none.
    pub fn measures_per_column(&self) -> usize {
        self.catalog()
            .map(MeasureCatalog::measures_per_column)
            .unwrap_or(0)
    }

    /// The underlying consumer.
    pub fn consumer(&self) -> &ProfilingStreamConsumer {
        &self.consumer
    }

    /// Mutable access to the underlying consumer.
    pub fn consumer_mut(&mut self) -> &mut ProfilingStreamConsumer {
        &mut self.consumer
    }

    /// Unwraps the consumer, e.g. to [`spawn`](ProfilingStreamConsumer::spawn) it.
    pub fn into_consumer(self) -> ProfilingStreamConsumer {
        self.consumer
    }

    /// Evaluates the current catalog over a registered table and consumes
    /// the resulting snapshot.
    ///
    /// # Errors
    /// Fails if no measures were set, or if the query fails.
    #[instrument(skip_all, fields(table = %engine.table_name()))]
    pub async fn profile_table(
        &mut self,
        ctx: &SessionContext,
        engine: &SqlMeasureEngine,
    ) -> ProfilerResult<f64> {
        let catalog = self.catalog().ok_or_else(|| {
            ProfilerError::custom("set_measures must be called before profiling a table")
        })?;
        let snapshot = engine.evaluate(ctx, catalog).await?;
        self.consumer.consume(snapshot).await
    }

    /// Drops all rolling history and the cached catalog.
    pub fn reset(&mut self) {
        self.consumer.reset();
        self.catalog = None;
    }
}

#[async_trait]
impl AutoProfiler for StatisticalProfiler {
    fn set_measures(&mut self, schema: &StreamSchema) -> MeasureCatalog {
        if let Some((cached_schema, catalog)) = &self.catalog {
            if cached_schema.same_layout(schema) {
                log_catalog!(self.log_config, measures = catalog.len(), "Reusing measure catalog");
                return catalog.clone();
            }
        }

        let catalog = self.builder.build(schema);
        log_catalog!(
            self.log_config,
            numeric_columns = ?catalog.numeric_columns(),
            measures_per_column = catalog.measures_per_column(),
            "Measure catalog set"
        );
        self.catalog = Some((schema.clone(), catalog.clone()));
        catalog
    }

    async fn consume_measures(&mut self, snapshot: Snapshot) -> ProfilerResult<f64> {
        self.consumer.consume(snapshot).await
    }

    fn name(&self) -> &str {
        "StatisticalProfiler"
    }
}
