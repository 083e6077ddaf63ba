//! Rolling-window profiling of measure streams.
//!
//! ## Components
//!
//! - **Measure catalog** (`measures`): decides which columns are numeric and
//!   names the six measures derived for each of them
//! - **Rolling history** (`history`): bounded per-measure FIFO windows and
//!   their means
//! - **Scoring** (`scorer`): relative deviation of a snapshot from the
//!   rolling means
//! - **Consumer** (`consumer`): applies snapshots in arrival order, scores
//!   them and hands the reports to sinks
//! - **Engine adapter** (`engine`): evaluates a catalog with DataFusion
//! - **Replay** (`replay`): feeds recorded JSON-lines snapshots to a profiler
//!
//! ## Update ordering
//!
//! By default a snapshot is pushed into the history before it is scored, so
//! the mean it is compared against already contains it. This pulls every
//! deviation toward zero, more so for small windows. Use
//! [`ScoringOrder::ScoreThenUpdate`] to compare against prior history only.
//!
//! ## Example
//!
//! ```rust
//! use term_profiler::profiling::{ProfilerConfig, ProfilingStreamConsumer, Snapshot};
//!
//! let config = ProfilerConfig::builder().window_size(3).build().unwrap();
//! let mut consumer = ProfilingStreamConsumer::new(&config).unwrap();
//!
//! for value in [1.0, 2.0, 3.0, 4.0] {
//!     let snapshot: Snapshot = [("rows_total_count_prof_prof", value)].into_iter().collect();
//!     consumer.process(&snapshot);
//! }
//! assert_eq!(consumer.store().mean("rows_total_count_prof_prof"), Some(3.0));
//! ```

pub mod config;
pub mod consumer;
pub mod engine;
pub mod history;
pub mod measures;
pub mod profiler;
pub mod replay;
pub mod scorer;
pub mod sink;
pub mod snapshot;

pub use config::{ProfilerConfig, ProfilerConfigBuilder, ScoringOrder, DEFAULT_WINDOW_SIZE};
pub use consumer::{ConsumerHandle, ProfilingStreamConsumer, SnapshotSender};
pub use engine::SqlMeasureEngine;
pub use history::{RollingHistoryStore, RollingMeanTable, RollingWindow};
pub use measures::{
    CastabilityProbe, DeclaredTypeProbe, MeasureCatalog, MeasureCatalogBuilder, MeasureKind,
    MeasureSpec, SampleCastProbe, StreamSchema,
};
pub use profiler::{AutoProfiler, StatisticalProfiler};
pub use replay::replay_lines;
pub use scorer::{AnomalyScorer, RelativeDeviationScorer, ScoreBreakdown};
pub use sink::{
    ConsoleSink, MemorySink, ProfilingReport, ReportFormat, ReportSink, TracingSink, WriterSink,
};
pub use snapshot::Snapshot;
