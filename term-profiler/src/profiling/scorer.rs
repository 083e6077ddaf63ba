//! Anomaly scoring of snapshots against rolling means.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::history::RollingMeanTable;
use super::snapshot::Snapshot;

/// Scores a snapshot for how far it sits from recent history.
///
/// Implementations must return a non-negative score for finite input and
/// `0.0` when no measure of the snapshot has a rolling mean.
pub trait AnomalyScorer: Send + Sync {
    /// Scores `snapshot` against the given rolling means.
    fn score(&self, snapshot: &Snapshot, means: &RollingMeanTable) -> f64;

    /// Returns the name of this scorer.
    fn name(&self) -> &str;
}

/// Per-measure deviations that make up a score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Relative deviation of every measure that had a rolling mean.
    pub deviations: BTreeMap<String, f64>,
    /// Mean of `deviations`, `0.0` if empty.
    pub score: f64,
}

impl ScoreBreakdown {
    /// The measure that deviates most, if any.
    pub fn largest(&self) -> Option<(&str, f64)> {
        self.deviations
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(name, deviation)| (name.as_str(), *deviation))
    }
}

/// Averages each measure's relative deviation from its rolling mean.
///
/// A zero mean has no scale to divide by; there the deviation is the
/// absolute current value.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelativeDeviationScorer;

impl RelativeDeviationScorer {
    /// Creates the scorer.
    pub fn new() -> Self {
        Self
    }

    /// Relative distance of `current` from `mean`.
    pub fn deviation(current: f64, mean: f64) -> f64 {
        if mean != 0.0 {
            (current - mean).abs() / mean.abs()
        } else if current != 0.0 {
            current.abs()
        } else {
            0.0
        }
    }

    /// Scores a snapshot and keeps the per-measure deviations.
    pub fn breakdown(&self, snapshot: &Snapshot, means: &RollingMeanTable) -> ScoreBreakdown {
        let deviations: BTreeMap<String, f64> = snapshot
            .iter()
            .filter_map(|(measure, current)| {
                means
                    .get(measure)
                    .map(|mean| (measure.to_string(), Self::deviation(current, *mean)))
            })
            .collect();

        let score = if deviations.is_empty() {
            0.0
        } else {
            deviations.values().sum::<f64>() / deviations.len() as f64
        };

        ScoreBreakdown { deviations, score }
    }
}

impl AnomalyScorer for RelativeDeviationScorer {
    fn score(&self, snapshot: &Snapshot, means: &RollingMeanTable) -> f64 {
        self.breakdown(snapshot, means).score
    }

    fn name(&self) -> &str {
        "RelativeDeviation"
    }
}
