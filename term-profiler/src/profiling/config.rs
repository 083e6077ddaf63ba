//! Configuration for the statistical profiler.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ProfilerError, ProfilerResult};

/// Default number of values retained per measure.
pub const DEFAULT_WINDOW_SIZE: usize = 10;

/// Metadata column the validation layer attaches to source rows.
pub const VALIDATION_METADATA_COLUMN: &str = "_validation_metadata";

/// Bookkeeping columns the streaming engine adds to every emitted row.
pub const ENGINE_TIME_COLUMN: &str = "__time__";
/// See [`ENGINE_TIME_COLUMN`].
pub const ENGINE_DIFF_COLUMN: &str = "__diff__";

/// When a snapshot is folded into the rolling history relative to scoring it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringOrder {
    /// Push the snapshot first, then score against means that include it.
    #[default]
    UpdateThenScore,
    /// Score against the means of prior history only, then push.
    ScoreThenUpdate,
}

/// Configuration for the statistical profiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Number of most recent values kept per measure.
    pub window_size: usize,
    /// Ordering of history update and scoring.
    pub scoring_order: ScoringOrder,
    /// Source columns never considered for profiling.
    pub reserved_columns: Vec<String>,
    /// Columns of emitted snapshot rows that are not measures.
    pub engine_metadata_columns: Vec<String>,
    /// Decimal digits kept for the missing-fraction measure.
    pub missing_fraction_precision: u32,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            scoring_order: ScoringOrder::default(),
            reserved_columns: vec![VALIDATION_METADATA_COLUMN.to_string()],
            engine_metadata_columns: vec![
                ENGINE_TIME_COLUMN.to_string(),
                ENGINE_DIFF_COLUMN.to_string(),
            ],
            missing_fraction_precision: 3,
        }
    }
}

impl ProfilerConfig {
    /// Creates a builder starting from the default configuration.
    pub fn builder() -> ProfilerConfigBuilder {
        ProfilerConfigBuilder::default()
    }

    /// Creates a configuration that compares each snapshot against prior
    /// history only.
    pub fn excluding_current() -> Self {
        Self {
            scoring_order: ScoringOrder::ScoreThenUpdate,
            ..Self::default()
        }
    }

    /// Checks that the configuration can drive a profiler.
    pub fn validate(&self) -> ProfilerResult<()> {
        if self.window_size == 0 {
            return Err(ProfilerError::invalid_config(
                "window_size must be at least 1",
            ));
        }
        if self.missing_fraction_precision > 15 {
            return Err(ProfilerError::invalid_config(format!(
                "missing_fraction_precision must be at most 15, got: {}",
                self.missing_fraction_precision
            )));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json_str(json: &str) -> ProfilerResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON configuration file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ProfilerResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Returns true if the named column is reserved metadata.
    pub fn is_reserved(&self, column: &str) -> bool {
        self.reserved_columns.iter().any(|c| c == column)
    }
}

/// Builder for [`ProfilerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ProfilerConfigBuilder {
    config: ProfilerConfig,
}

impl ProfilerConfigBuilder {
    /// Sets the rolling window size.
    pub fn window_size(mut self, size: usize) -> Self {
        self.config.window_size = size;
        self
    }

    /// Sets the update/score ordering.
    pub fn scoring_order(mut self, order: ScoringOrder) -> Self {
        self.config.scoring_order = order;
        self
    }

    /// Adds a reserved column excluded from profiling.
    pub fn reserved_column(mut self, column: impl Into<String>) -> Self {
        self.config.reserved_columns.push(column.into());
        self
    }

    /// Adds an engine bookkeeping column excluded from snapshots.
    pub fn engine_metadata_column(mut self, column: impl Into<String>) -> Self {
        self.config.engine_metadata_columns.push(column.into());
        self
    }

    /// Sets the rounding precision of the missing-fraction measure.
    pub fn missing_fraction_precision(mut self, digits: u32) -> Self {
        self.config.missing_fraction_precision = digits;
        self
    }

    /// Validates and returns the configuration.
    pub fn build(self) -> ProfilerResult<ProfilerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
