//! # Term Profiler - Streaming Data-Quality Profiling for Rust
//!
//! Term Profiler derives per-column summary statistics from a continuously
//! updated table and flags snapshots that drift from recent behavior. It is
//! the streaming counterpart of Term's batch validation: instead of asserting
//! fixed thresholds, it learns a rolling baseline per measure and scores how
//! far each new snapshot sits from it.
//!
//! ## Overview
//!
//! A profiling run has two phases:
//!
//! 1. **Measure derivation**: the [`MeasureCatalogBuilder`](profiling::MeasureCatalogBuilder)
//!    inspects the stream schema, keeps the numeric columns and names six
//!    measures for each (min, max, mean, missing count, total count, missing
//!    fraction). The streaming engine computes those measures per window.
//! 2. **Consumption**: every snapshot of measure values the engine emits is
//!    pushed into a bounded rolling history, scored against the rolling
//!    means, and handed to reporting sinks.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use arrow::array::{ArrayRef, Float64Array, Int64Array};
//! use arrow::datatypes::{DataType, Field, Schema};
//! use arrow::record_batch::RecordBatch;
//! use datafusion::prelude::*;
//! use term_profiler::prelude::*;
//! use term_profiler::profiling::{MemorySink, SqlMeasureEngine};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let schema = Arc::new(Schema::new(vec![
//!     Field::new("ts", DataType::Int64, false),
//!     Field::new("sensor", DataType::Int64, false),
//!     Field::new("temperature", DataType::Float64, true),
//! ]));
//!
//! let sink = MemorySink::new();
//! let mut profiler = StatisticalProfiler::new(ProfilerConfig::default())?.with_sink(sink.clone());
//! profiler.set_measures(&StreamSchema::new(schema.clone(), "ts", "sensor"));
//!
//! // Each window of the stream is registered and profiled in turn
//! let batch = RecordBatch::try_new(
//!     schema,
//!     vec![
//!         Arc::new(Int64Array::from(vec![1, 2])) as ArrayRef,
//!         Arc::new(Int64Array::from(vec![7, 7])),
//!         Arc::new(Float64Array::from(vec![21.5, 22.5])),
//!     ],
//! )?;
//! let ctx = SessionContext::new();
//! ctx.register_batch("window", batch)?;
//!
//! let score = profiler.profile_table(&ctx, &SqlMeasureEngine::new("window")).await?;
//! assert_eq!(score, 0.0);
//!
//! let reports = sink.reports().await;
//! assert_eq!(reports[0].snapshot.get("temperature_mean_prof"), Some(22.0));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! ## Architecture
//!
//! - **`profiling`**: measure catalog, rolling history, scoring, the stream
//!   consumer, reporting sinks and the DataFusion engine adapter
//! - **`logging`**: log configuration and subscriber setup
//! - **`error`**: the crate error type

pub mod error;
pub mod logging;
pub mod prelude;
pub mod profiling;

pub use error::{ProfilerError, ProfilerResult};
