//! Prelude for commonly used types and traits in term-profiler.

pub use crate::error::{ProfilerError, ProfilerResult};
pub use crate::logging::LogConfig;
pub use crate::profiling::{
    AnomalyScorer, AutoProfiler, MeasureCatalog, ProfilerConfig, ProfilingStreamConsumer,
    ReportSink, Snapshot, StatisticalProfiler, StreamSchema,
};
