//! Reporting sinks that receive each scored snapshot.
//!
//! The consumer hands every processed snapshot and its anomaly score to the
//! sinks it was configured with. Sinks decide presentation and delivery; the
//! profiler only produces values.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::snapshot::Snapshot;
use crate::error::{ProfilerError, ProfilerResult};

/// A snapshot together with the anomaly score it received.
///
/// A non-finite score or measure value is serialized as a string (`"NaN"`,
/// `"inf"`, `"-inf"`) so JSON-lines output parses back losslessly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfilingReport {
    /// Position of the snapshot in arrival order, starting at 1.
    pub sequence: u64,
    /// When the consumer processed the snapshot.
    pub received_at: DateTime<Utc>,
    /// The anomaly score.
    #[serde(with = "crate::profiling::snapshot::measure_value")]
    pub score: f64,
    /// The measure values as received.
    pub snapshot: Snapshot,
}

impl ProfilingReport {
    /// Creates a report stamped with the current time.
    pub fn new(sequence: u64, snapshot: Snapshot, score: f64) -> Self {
        Self {
            sequence,
            received_at: Utc::now(),
            score,
            snapshot,
        }
    }
}

/// Destination for profiling reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Delivers one report.
    async fn report(&self, report: &ProfilingReport) -> ProfilerResult<()>;

    /// Returns the name of this sink.
    fn name(&self) -> &str;
}

/// Output format of a [`WriterSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Two human-readable lines per report.
    Human,
    /// One JSON object per line.
    JsonLines,
}

/// Writes reports to any async writer.
pub struct WriterSink<W> {
    writer: Mutex<W>,
    format: ReportFormat,
    name: String,
}

/// Human-readable reports on standard output.
pub type ConsoleSink = WriterSink<tokio::io::Stdout>;

impl ConsoleSink {
    /// Creates a human-readable sink on standard output.
    pub fn stdout() -> Self {
        WriterSink::new(tokio::io::stdout(), ReportFormat::Human).with_name("console")
    }
}

impl<W: AsyncWrite + Unpin + Send> WriterSink<W> {
    /// Creates a sink writing in the given format.
    pub fn new(writer: W, format: ReportFormat) -> Self {
        let name = match format {
            ReportFormat::Human => "writer",
            ReportFormat::JsonLines => "json_lines",
        };
        Self {
            writer: Mutex::new(writer),
            format,
            name: name.to_string(),
        }
    }

    /// Creates a human-readable sink.
    pub fn human(writer: W) -> Self {
        Self::new(writer, ReportFormat::Human)
    }

    /// Creates a JSON-lines sink.
    pub fn json_lines(writer: W) -> Self {
        Self::new(writer, ReportFormat::JsonLines)
    }

    /// Renames the sink in logs and errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn render(&self, report: &ProfilingReport) -> ProfilerResult<String> {
        match self.format {
            ReportFormat::Human => Ok(format!(
                "Current profiling measures: {}\nCurrent anomaly score: {:.4}\n",
                report.snapshot, report.score
            )),
            ReportFormat::JsonLines => {
                let mut line = serde_json::to_string(report)?;
                line.push('\n');
                Ok(line)
            }
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> ReportSink for WriterSink<W> {
    async fn report(&self, report: &ProfilingReport) -> ProfilerResult<()> {
        let rendered = self.render(report)?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(rendered.as_bytes())
            .await
            .map_err(|e| ProfilerError::sink(&self.name, e.to_string()))?;
        writer
            .flush()
            .await
            .map_err(|e| ProfilerError::sink(&self.name, e.to_string()))?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Emits reports as `tracing` events, escalating above a threshold.
#[derive(Debug, Clone, Default)]
pub struct TracingSink {
    alert_threshold: Option<f64>,
}

impl TracingSink {
    /// Creates a sink logging every report at info level.
    pub fn new() -> Self {
        Self::default()
    }

    /// Logs reports scoring above `threshold` at warn level.
    pub fn with_alert_threshold(mut self, threshold: f64) -> Self {
        self.alert_threshold = Some(threshold);
        self
    }
}

#[async_trait]
impl ReportSink for TracingSink {
    async fn report(&self, report: &ProfilingReport) -> ProfilerResult<()> {
        match self.alert_threshold {
            Some(threshold) if report.score > threshold => warn!(
                sequence = report.sequence,
                score = report.score,
                threshold,
                measures = report.snapshot.len(),
                "Anomaly score above threshold"
            ),
            _ => info!(
                sequence = report.sequence,
                score = report.score,
                measures = report.snapshot.len(),
                "Profiled snapshot"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "tracing"
    }
}

/// Keeps every report in memory.
///
/// Clones share storage, so a clone handed to a consumer can be read from
/// the caller's side.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    reports: Arc<RwLock<Vec<ProfilingReport>>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports received so far, in arrival order.
    pub async fn reports(&self) -> Vec<ProfilingReport> {
        self.reports.read().await.clone()
    }

    /// Scores received so far, in arrival order.
    pub async fn scores(&self) -> Vec<f64> {
        self.reports.read().await.iter().map(|r| r.score).collect()
    }

    /// Number of reports received.
    pub async fn len(&self) -> usize {
        self.reports.read().await.len()
    }

    /// Returns true if nothing was received.
    pub async fn is_empty(&self) -> bool {
        self.reports.read().await.is_empty()
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn report(&self, report: &ProfilingReport) -> ProfilerResult<()> {
        self.reports.write().await.push(report.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_report() -> ProfilingReport {
        let snapshot: Snapshot = [("a_mean_prof", 12.0), ("b_mean_prof", 0.0)]
            .into_iter()
            .collect();
        ProfilingReport::new(1, snapshot, 0.1)
    }

    #[tokio::test]
    async fn test_human_format() {
        let sink = WriterSink::human(Vec::new());
        sink.report(&sample_report()).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            output,
            "Current profiling measures: {a_mean_prof: 12, b_mean_prof: 0}\n\
             Current anomaly score: 0.1000\n"
        );
    }

    #[tokio::test]
    async fn test_json_lines_format() {
        let sink = WriterSink::json_lines(Vec::new());
        sink.report(&sample_report()).await.unwrap();
        sink.report(&sample_report()).await.unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: ProfilingReport = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed.sequence, 1);
        assert_eq!(parsed.snapshot.get("a_mean_prof"), Some(12.0));
    }

    #[tokio::test]
    async fn test_json_lines_keeps_non_finite_values() {
        let snapshot: Snapshot = [("a_max_prof", f64::INFINITY), ("a_min_prof", 1.0)]
            .into_iter()
            .collect();
        let sink = WriterSink::json_lines(Vec::new());
        sink.report(&ProfilingReport::new(3, snapshot, f64::NAN))
            .await
            .unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.contains(r#""score":"NaN""#));

        let parsed: ProfilingReport = serde_json::from_str(output.trim_end()).unwrap();
        assert!(parsed.score.is_nan());
        assert_eq!(parsed.snapshot.get("a_max_prof"), Some(f64::INFINITY));
        assert_eq!(parsed.snapshot.get("a_min_prof"), Some(1.0));
    }

    #[tokio::test]
    async fn test_memory_sink_shares_storage() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        assert!(handle.is_empty().await);

        sink.report(&sample_report()).await.unwrap();
        assert_eq!(handle.len().await, 1);
        assert_eq!(handle.scores().await, vec![0.1]);
    }

    #[tokio::test]
    async fn test_tracing_sink_never_fails() {
        let sink = TracingSink::new().with_alert_threshold(0.05);
        assert!(sink.report(&sample_report()).await.is_ok());
        assert_eq!(sink.name(), "tracing");
    }
}
