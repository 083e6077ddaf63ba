//! Logging utilities and configuration for the profiler.
//!
//! Per-snapshot logging sits on the hot path of a stream, so it is gated by
//! [`LogConfig`] rather than left to the subscriber's filter alone.

use tracing::Level;

/// Logging configuration for profiler components.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Most verbose level the gated macros emit at
    pub base_level: Level,
    /// Whether to log every snapshot's values and score
    pub log_snapshot_details: bool,
    /// Whether to log catalog builds and column eligibility decisions
    pub log_catalog_operations: bool,
    /// Maximum length for logged field values (to prevent huge logs)
    pub max_field_length: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            base_level: Level::INFO,
            log_snapshot_details: false,
            log_catalog_operations: true,
            max_field_length: 256,
        }
    }
}

impl LogConfig {
    /// Creates a verbose configuration suitable for debugging.
    pub fn verbose() -> Self {
        Self {
            base_level: Level::DEBUG,
            log_snapshot_details: true,
            log_catalog_operations: true,
            max_field_length: 1024,
        }
    }

    /// Creates a minimal configuration for production with lowest overhead.
    pub fn production() -> Self {
        Self {
            base_level: Level::WARN,
            log_snapshot_details: false,
            log_catalog_operations: false,
            max_field_length: 128,
        }
    }

    /// Creates a balanced configuration suitable for most use cases.
    pub fn balanced() -> Self {
        Self::default()
    }

    /// Returns true if per-snapshot debug events should be emitted.
    pub fn snapshot_logging_enabled(&self) -> bool {
        self.log_snapshot_details && self.base_level >= Level::DEBUG
    }

    /// Returns true if catalog info events should be emitted.
    pub fn catalog_logging_enabled(&self) -> bool {
        self.log_catalog_operations && self.base_level >= Level::INFO
    }
}

/// Macro for conditional per-snapshot logging.
#[macro_export]
macro_rules! log_snapshot {
    ($config:expr, $($arg:tt)*) => {
        if $config.snapshot_logging_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

/// Macro for conditional catalog logging.
#[macro_export]
macro_rules! log_catalog {
    ($config:expr, $($arg:tt)*) => {
        if $config.catalog_logging_enabled() {
            tracing::info!($($arg)*);
        }
    };
}

/// Truncates a string to the maximum field length if needed.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    // Cut on a char boundary so multi-byte column names don't panic.
    let mut end = max_length;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...(truncated)", &value[..end])
}

/// Utilities for installing a `tracing` subscriber.
pub mod setup {
    use std::str::FromStr;

    use tracing::Level;

    use crate::error::ProfilerError;

    /// Environment variable selecting the output format, see [`LogFormat`].
    pub const LOG_FORMAT_ENV: &str = "TERM_PROFILER_LOG_FORMAT";

    /// How events are rendered on stderr.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum LogFormat {
        /// Multi-field human-readable lines.
        #[default]
        Full,
        /// Abbreviated single lines.
        Compact,
        /// One JSON object per event.
        Json,
    }

    impl FromStr for LogFormat {
        type Err = ProfilerError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            match s.trim().to_ascii_lowercase().as_str() {
                "full" | "text" => Ok(Self::Full),
                "compact" => Ok(Self::Compact),
                "json" => Ok(Self::Json),
                other => Err(ProfilerError::invalid_config(format!(
                    "unknown log format '{other}', expected full, compact or json"
                ))),
            }
        }
    }

    /// Configuration for the profiler's logging setup.
    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Log level for everything outside the profiler
        pub level: Level,
        /// Log level for profiler components specifically
        pub profiler_level: Level,
        /// Output format
        pub format: LogFormat,
        /// Environment filter override
        pub env_filter: Option<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                level: Level::INFO,
                profiler_level: Level::DEBUG,
                format: LogFormat::Full,
                env_filter: None,
            }
        }
    }

    impl LoggingConfig {
        /// Creates a configuration for long-running pipelines: warnings from
        /// dependencies, info from the profiler, JSON output.
        pub fn production() -> Self {
            Self {
                level: Level::WARN,
                profiler_level: Level::INFO,
                format: LogFormat::Json,
                env_filter: None,
            }
        }

        /// Creates the default configuration with the format taken from
        /// `TERM_PROFILER_LOG_FORMAT` when it is set.
        ///
        /// # Errors
        /// Returns an error if the variable holds an unknown format.
        pub fn from_env() -> Result<Self, ProfilerError> {
            match std::env::var(LOG_FORMAT_ENV) {
                Ok(value) => Ok(Self::default().with_format(value.parse()?)),
                Err(_) => Ok(Self::default()),
            }
        }

        /// Sets the log level for profiler components.
        pub fn with_profiler_level(mut self, level: Level) -> Self {
            self.profiler_level = level;
            self
        }

        /// Sets the output format.
        pub fn with_format(mut self, format: LogFormat) -> Self {
            self.format = format;
            self
        }

        /// Sets a custom environment filter.
        pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
            self.env_filter = Some(filter.into());
            self
        }

        /// Builds the environment filter string.
        pub fn env_filter(&self) -> String {
            match &self.env_filter {
                Some(filter) => filter.clone(),
                None => format!(
                    "{},term_profiler={},profile_replay={}",
                    self.level.as_str().to_lowercase(),
                    self.profiler_level.as_str().to_lowercase(),
                    self.profiler_level.as_str().to_lowercase()
                ),
            }
        }
    }

    /// Initializes logging to stderr, keeping stdout free for reports.
    ///
    /// `RUST_LOG` takes precedence over the configured filter when set.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use term_profiler::logging::setup::{init_logging, LogFormat, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::default().with_format(LogFormat::Json)).unwrap();
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.env_filter()));

        let fmt_layer = match config.format {
            LogFormat::Full => tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .json()
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;

        Ok(())
    }
}
