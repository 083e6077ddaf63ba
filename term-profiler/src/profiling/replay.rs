//! Replay of recorded snapshots from a JSON-lines source.
//!
//! Each non-blank line is one JSON object mapping measure names to numbers
//! (or `"NaN"`, `"inf"`, `"-inf"`). Lines are consumed in order, so a replay
//! reproduces the scores of the original run.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, info, instrument};

use super::profiler::AutoProfiler;
use super::snapshot::Snapshot;
use crate::error::{ProfilerError, ProfilerResult};

/// Feeds every snapshot line of `reader` to the profiler.
///
/// Blank lines are skipped. Returns the number of snapshots consumed.
///
/// # Errors
/// A line that is not a snapshot stops the replay with
/// [`ProfilerError::InvalidData`] naming the line; snapshots before it have
/// already been consumed. Read and sink errors are returned as they occur.
#[instrument(skip_all, fields(profiler = %profiler.name()))]
pub async fn replay_lines<R, P>(reader: R, profiler: &mut P) -> ProfilerResult<u64>
where
    R: AsyncBufRead + Unpin,
    P: AutoProfiler + ?Sized,
{
    let mut lines = reader.lines();
    let mut line_number = 0u64;
    let mut consumed = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }
        let snapshot: Snapshot = serde_json::from_str(&line).map_err(|e| {
            error!(line = line_number, error = %e, "Malformed snapshot");
            ProfilerError::invalid_data(format!("line {line_number}: {e}"))
        })?;
        profiler.consume_measures(snapshot).await?;
        consumed += 1;
    }

    info!(consumed, lines = line_number, "Replay finished");
    Ok(consumed)
}
