//! Bounded per-measure history and rolling means.

use std::collections::{HashMap, VecDeque};

use tracing::trace;

use crate::error::{ProfilerError, ProfilerResult};

/// Rolling mean per measure name.
///
/// A measure is absent until its first value has been pushed.
pub type RollingMeanTable = HashMap<String, f64>;

/// Fixed-capacity FIFO of the most recent values of one measure.
///
/// Values are ordered oldest to newest and the length never exceeds the
/// capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingWindow {
    values: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    /// Creates an empty window. `capacity` must be non-zero.
    ///
    /// Storage grows with the values pushed, not with `capacity`.
    fn with_capacity(capacity: usize) -> Self {
        Self {
            values: VecDeque::new(),
            capacity,
        }
    }

    /// Appends a value, evicting the oldest one when the window is full.
    fn push(&mut self, value: f64) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    /// Arithmetic mean of the current contents, recomputed in full.
    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    /// Iterates over the values, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Copies the values out, oldest first.
    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    /// Number of values currently held.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if no value has been pushed.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns true once the window holds `capacity` values.
    pub fn is_full(&self) -> bool {
        self.values.len() == self.capacity
    }

    /// Maximum number of values held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Owner of every measure's rolling window and rolling mean.
///
/// The store is instance scoped: create one per profiler run and drop or
/// [`reset`](Self::reset) it when the run ends. It does no locking; callers
/// feeding it from several producers must serialize updates first.
#[derive(Debug, Clone)]
pub struct RollingHistoryStore {
    window_size: usize,
    windows: HashMap<String, RollingWindow>,
    means: RollingMeanTable,
}

impl RollingHistoryStore {
    /// Creates an empty store keeping `window_size` values per measure.
    ///
    /// # Errors
    /// Returns an error if `window_size` is zero.
    pub fn new(window_size: usize) -> ProfilerResult<Self> {
        if window_size == 0 {
            return Err(ProfilerError::invalid_config(
                "window_size must be at least 1",
            ));
        }
        Ok(Self {
            window_size,
            windows: HashMap::new(),
            means: RollingMeanTable::new(),
        })
    }

    /// Appends a value to the measure's window and refreshes its rolling mean.
    ///
    /// Non-finite values are stored as given.
    pub fn push(&mut self, measure: &str, value: f64) {
        let window_size = self.window_size;
        let window = self
            .windows
            .entry(measure.to_string())
            .or_insert_with(|| RollingWindow::with_capacity(window_size));
        window.push(value);

        if let Some(mean) = window.mean() {
            trace!(measure, value, mean, len = window.len(), "Updated rolling window");
            self.means.insert(measure.to_string(), mean);
        }
    }

    /// Current rolling mean of a measure, `None` if nothing was pushed for it.
    pub fn mean(&self, measure: &str) -> Option<f64> {
        self.means.get(measure).copied()
    }

    /// Rolling means of every measure seen so far.
    pub fn means(&self) -> &RollingMeanTable {
        &self.means
    }

    /// The window of a measure, if any value was pushed for it.
    pub fn window(&self, measure: &str) -> Option<&RollingWindow> {
        self.windows.get(measure)
    }

    /// Configured capacity of every window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of measures with history.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Returns true if no measure has history.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Drops all history and means.
    pub fn reset(&mut self) {
        self.windows.clear();
        self.means.clear();
    }
}
