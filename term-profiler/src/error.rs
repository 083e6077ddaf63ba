//! Error types for the Term profiler.
//!
//! The rolling statistics core (history, scoring, catalog building) never
//! fails on well-formed input. Errors only surface at the edges: configuration
//! validation, Arrow/DataFusion interaction, and report delivery.

use thiserror::Error;

/// Result type for profiler operations.
pub type ProfilerResult<T> = Result<T, ProfilerError>;

/// Errors that can occur while profiling a stream.
#[derive(Error, Debug)]
pub enum ProfilerError {
    /// Invalid configuration or parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input data that cannot be turned into measure values.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// DataFusion query execution error.
    #[error("Query execution failed: {0}")]
    QueryExecution(#[from] datafusion::error::DataFusionError),

    /// Arrow computation error.
    #[error("Arrow computation failed: {0}")]
    ArrowComputation(#[from] arrow::error::ArrowError),

    /// Error from I/O operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A reporting sink rejected a report.
    #[error("Report delivery failed for sink '{sink}': {message}")]
    SinkDelivery {
        /// Name of the sink that failed
        sink: String,
        /// Detailed error message
        message: String,
    },

    /// The consumer task is gone and no longer accepts snapshots.
    #[error("Profiling consumer is closed")]
    ConsumerClosed,

    /// Generic profiler error with custom message.
    #[error("{0}")]
    Custom(String),
}

impl ProfilerError {
    /// Creates an invalid configuration error with the given message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates an invalid data error with the given message.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Creates a sink delivery error.
    pub fn sink(sink: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::SinkDelivery {
            sink: sink.into(),
            message: msg.into(),
        }
    }

    /// Creates a custom error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Custom(format!("Internal error: {}", msg.into()))
    }
}

/// Converts serde_json errors to ProfilerError.
impl From<serde_json::Error> for ProfilerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
