//! Ordered consumption of measure snapshots.
//!
//! The consumer is the only writer of its [`RollingHistoryStore`]. Snapshots
//! are applied strictly in the order they are handed in; when several
//! producers exist, [`ProfilingStreamConsumer::spawn`] puts a single bounded
//! queue in front of the consumer so their deliveries are serialized.

use arrow::record_batch::RecordBatch;
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use super::config::{ProfilerConfig, ScoringOrder};
use super::history::RollingHistoryStore;
use super::scorer::{AnomalyScorer, RelativeDeviationScorer};
use super::sink::{ProfilingReport, ReportSink};
use super::snapshot::Snapshot;
use crate::error::{ProfilerError, ProfilerResult};
use crate::logging::LogConfig;

/// Sending side of a spawned consumer's queue.
pub type SnapshotSender = mpsc::Sender<Snapshot>;

/// Applies snapshots to the rolling history, scores them and reports them.
pub struct ProfilingStreamConsumer {
    store: RollingHistoryStore,
    scorer: Box<dyn AnomalyScorer>,
    sinks: Vec<Box<dyn ReportSink>>,
    scoring_order: ScoringOrder,
    engine_metadata_columns: Vec<String>,
    log_config: LogConfig,
    processed: u64,
}

impl std::fmt::Debug for ProfilingStreamConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfilingStreamConsumer")
            .field("scorer", &self.scorer.name())
            .field(
                "sinks",
                &self.sinks.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("scoring_order", &self.scoring_order)
            .field("window_size", &self.store.window_size())
            .field("processed", &self.processed)
            .finish()
    }
}

impl ProfilingStreamConsumer {
    /// Creates a consumer with the relative-deviation scorer and no sinks.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid.
    pub fn new(config: &ProfilerConfig) -> ProfilerResult<Self> {
        config.validate()?;
        Ok(Self {
            store: RollingHistoryStore::new(config.window_size)?,
            scorer: Box::new(RelativeDeviationScorer::new()),
            sinks: Vec::new(),
            scoring_order: config.scoring_order,
            engine_metadata_columns: config.engine_metadata_columns.clone(),
            log_config: LogConfig::default(),
            processed: 0,
        })
    }

    /// Replaces the scorer.
    pub fn with_scorer(mut self, scorer: impl AnomalyScorer + 'static) -> Self {
        self.scorer = Box::new(scorer);
        self
    }

    /// Adds a sink; every report goes to every sink in insertion order.
    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    /// Sets the logging configuration.
    pub fn with_log_config(mut self, log_config: LogConfig) -> Self {
        self.log_config = log_config;
        self
    }

    /// Folds a snapshot into the history and scores it, without reporting.
    ///
    /// Engine bookkeeping entries (`__time__`, `__diff__` by default) are
    /// not measures and are ignored.
    pub fn process(&mut self, snapshot: &Snapshot) -> f64 {
        if self.carries_engine_columns(snapshot) {
            let measures = snapshot.clone().without(&self.engine_metadata_columns);
            self.process_measures(&measures)
        } else {
            self.process_measures(snapshot)
        }
    }

    fn carries_engine_columns(&self, snapshot: &Snapshot) -> bool {
        self.engine_metadata_columns
            .iter()
            .any(|column| snapshot.contains(column))
    }

    fn process_measures(&mut self, snapshot: &Snapshot) -> f64 {
        let score = match self.scoring_order {
            ScoringOrder::UpdateThenScore => {
                self.push_all(snapshot);
                self.scorer.score(snapshot, self.store.means())
            }
            ScoringOrder::ScoreThenUpdate => {
                let score = self.scorer.score(snapshot, self.store.means());
                self.push_all(snapshot);
                score
            }
        };
        self.processed += 1;

        crate::log_snapshot!(
            self.log_config,
            sequence = self.processed,
            score,
            measures = snapshot.len(),
            snapshot = %crate::logging::truncate_field(
                &snapshot.to_string(),
                self.log_config.max_field_length
            ),
            "Scored snapshot"
        );

        score
    }

    fn push_all(&mut self, snapshot: &Snapshot) {
        for (measure, value) in snapshot.iter() {
            self.store.push(measure, value);
        }
    }

    /// Processes a snapshot and delivers the report to every sink.
    ///
    /// Returns the anomaly score. Reports carry the snapshot without engine
    /// bookkeeping entries. A sink failure is returned after the history has
    /// already been updated.
    #[instrument(skip_all, fields(sequence = self.processed + 1, measures = snapshot.len()))]
    pub async fn consume(&mut self, snapshot: Snapshot) -> ProfilerResult<f64> {
        let snapshot = snapshot.without(&self.engine_metadata_columns);
        let score = self.process_measures(&snapshot);
        let report = ProfilingReport::new(self.processed, snapshot, score);
        for sink in &self.sinks {
            sink.report(&report).await?;
        }
        Ok(score)
    }

    /// Consumes every row of an engine output batch as its own snapshot.
    ///
    /// Engine bookkeeping columns from the configuration are not measures
    /// and are dropped before processing.
    pub async fn consume_batch(&mut self, batch: &RecordBatch) -> ProfilerResult<Vec<f64>> {
        let snapshots = Snapshot::from_record_batch(batch, &self.engine_metadata_columns)?;
        let mut scores = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            scores.push(self.consume(snapshot).await?);
        }
        Ok(scores)
    }

    /// Consumes a stream to its end, returning how many snapshots it held.
    pub async fn run<S>(&mut self, stream: S) -> ProfilerResult<u64>
    where
        S: Stream<Item = Snapshot>,
    {
        futures::pin_mut!(stream);
        let mut consumed = 0u64;
        while let Some(snapshot) = stream.next().await {
            self.consume(snapshot).await?;
            consumed += 1;
        }
        info!(consumed, total = self.processed, "Snapshot stream ended");
        Ok(consumed)
    }

    /// Moves the consumer onto a task fed by a bounded queue.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self, capacity: usize) -> ConsumerHandle {
        let (sender, mut receiver) = mpsc::channel::<Snapshot>(capacity.max(1));
        let task = tokio::spawn(async move {
            let mut consumer = self;
            while let Some(snapshot) = receiver.recv().await {
                consumer.consume(snapshot).await?;
            }
            debug!(processed = consumer.processed, "Consumer queue closed");
            Ok::<_, ProfilerError>(consumer)
        });
        ConsumerHandle { sender, task }
    }

    /// The rolling history.
    pub fn store(&self) -> &RollingHistoryStore {
        &self.store
    }

    /// Number of snapshots processed since creation or the last reset.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Update/score ordering in effect.
    pub fn scoring_order(&self) -> ScoringOrder {
        self.scoring_order
    }

    /// Forgets all history, as after a restart.
    pub fn reset(&mut self) {
        self.store.reset();
        self.processed = 0;
    }
}

/// Handle to a consumer running on its own task.
pub struct ConsumerHandle {
    sender: SnapshotSender,
    task: JoinHandle<ProfilerResult<ProfilingStreamConsumer>>,
}

impl ConsumerHandle {
    /// A sender for an additional producer.
    pub fn sender(&self) -> SnapshotSender {
        self.sender.clone()
    }

    /// Queues a snapshot, waiting while the queue is full.
    pub async fn send(&self, snapshot: Snapshot) -> ProfilerResult<()> {
        self.sender
            .send(snapshot)
            .await
            .map_err(|_| ProfilerError::ConsumerClosed)
    }

    /// Closes the queue and waits for the consumer to drain it.
    ///
    /// Senders obtained from [`sender`](Self::sender) must be dropped first,
    /// otherwise this waits for them.
    pub async fn shutdown(self) -> ProfilerResult<ProfilingStreamConsumer> {
        drop(self.sender);
        self.task
            .await
            .map_err(|e| ProfilerError::internal(format!("consumer task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiling::sink::MemorySink;
    use arrow::array::{Float64Array, Int64Array};
    use arrow::datatypes::{DataType, Field, Schema};
    use std::sync::Arc;

    fn snapshot(entries: &[(&str, f64)]) -> Snapshot {
        entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn consumer(window_size: usize) -> ProfilingStreamConsumer {
        let config = ProfilerConfig::builder()
            .window_size(window_size)
            .build()
            .unwrap();
        ProfilingStreamConsumer::new(&config).unwrap()
    }

    #[test]
    fn test_first_snapshot_scores_zero() {
        let mut consumer = consumer(10);
        let score = consumer.process(&snapshot(&[("a", 42.0), ("b", 0.0)]));
        assert_eq!(score, 0.0);
        assert_eq!(consumer.store().mean("a"), Some(42.0));
        assert_eq!(consumer.processed(), 1);
    }

    #[test]
    fn test_update_then_score_includes_current_value() {
        let mut consumer = consumer(10);
        consumer.process(&snapshot(&[("a", 8.0), ("b", 0.0)]));
        // Mean of a after update: (8 + 12) / 2 = 10, deviation 0.2; b stays 0
        let score = consumer.process(&snapshot(&[("a", 12.0), ("b", 0.0)]));
        assert!((score - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_score_then_update_excludes_current_value() {
        let config = ProfilerConfig::excluding_current();
        let mut consumer = ProfilingStreamConsumer::new(&config).unwrap();

        // No history yet: nothing to compare against
        assert_eq!(consumer.process(&snapshot(&[("a", 10.0)])), 0.0);
        let score = consumer.process(&snapshot(&[("a", 12.0)]));
        assert!((score - 0.2).abs() < 1e-12);
        assert_eq!(consumer.store().mean("a"), Some(11.0));
    }

    #[tokio::test]
    async fn test_consume_reports_to_sinks() {
        let sink = MemorySink::new();
        let mut consumer = consumer(3).with_sink(sink.clone());

        consumer.consume(snapshot(&[("a", 1.0)])).await.unwrap();
        let score = consumer.consume(snapshot(&[("a", 3.0)])).await.unwrap();
        assert!((score - 0.5).abs() < 1e-12);

        let reports = sink.reports().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].sequence, 1);
        assert_eq!(reports[1].sequence, 2);
        assert_eq!(reports[1].snapshot.get("a"), Some(3.0));
        assert_eq!(reports[1].score, score);
    }

    #[tokio::test]
    async fn test_consume_batch_skips_engine_columns() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("x_mean_prof", DataType::Float64, false),
            Field::new("__time__", DataType::Int64, false),
            Field::new("__diff__", DataType::Int64, false),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Float64Array::from(vec![4.0, 8.0])),
                Arc::new(Int64Array::from(vec![1, 2])),
                Arc::new(Int64Array::from(vec![1, 1])),
            ],
        )
        .unwrap();

        let mut consumer = consumer(10);
        let scores = consumer.consume_batch(&batch).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0], 0.0);
        // mean (4 + 8) / 2 = 6, |8 - 6| / 6
        assert!((scores[1] - 1.0 / 3.0).abs() < 1e-12);
        assert!(consumer.store().window("__time__").is_none());
    }

    #[tokio::test]
    async fn test_run_consumes_stream_in_order() {
        let mut consumer = consumer(2);
        let snapshots = vec![
            snapshot(&[("a", 1.0)]),
            snapshot(&[("a", 2.0)]),
            snapshot(&[("a", 3.0)]),
        ];

        let consumed = consumer
            .run(futures::stream::iter(snapshots))
            .await
            .unwrap();
        assert_eq!(consumed, 3);
        assert_eq!(consumer.store().window("a").unwrap().to_vec(), vec![2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_spawned_consumer_drains_queue() {
        let sink = MemorySink::new();
        let handle = consumer(5).with_sink(sink.clone()).spawn(4);

        for value in [1.0, 2.0, 3.0] {
            handle.send(snapshot(&[("a", value)])).await.unwrap();
        }
        let consumer = handle.shutdown().await.unwrap();

        assert_eq!(consumer.processed(), 3);
        assert_eq!(consumer.store().mean("a"), Some(2.0));
        assert_eq!(sink.len().await, 3);
    }

    #[test]
    fn test_engine_columns_are_not_measures() {
        let mut consumer = consumer(10);
        consumer.process(&snapshot(&[
            ("x_mean_prof", 10.0),
            ("__time__", 1000.0),
            ("__diff__", 1.0),
        ]));
        let score = consumer.process(&snapshot(&[
            ("x_mean_prof", 10.0),
            ("__time__", 3000.0),
            ("__diff__", 1.0),
        ]));

        assert_eq!(score, 0.0);
        assert!(consumer.store().window("__time__").is_none());
        assert!(consumer.store().window("__diff__").is_none());
        assert_eq!(consumer.store().len(), 1);
    }

    #[tokio::test]
    async fn test_reports_omit_engine_columns() {
        let sink = MemorySink::new();
        let mut consumer = consumer(10).with_sink(sink.clone());
        consumer
            .consume(snapshot(&[("x_mean_prof", 4.0), ("__time__", 17.0)]))
            .await
            .unwrap();

        let reports = sink.reports().await;
        assert_eq!(reports[0].snapshot.len(), 1);
        assert!(!reports[0].snapshot.contains("__time__"));
    }

    #[test]
    fn test_reset() {
        let mut consumer = consumer(5);
        consumer.process(&snapshot(&[("a", 1.0)]));
        consumer.reset();
        assert!(consumer.store().is_empty());
        assert_eq!(consumer.processed(), 0);
    }
}
