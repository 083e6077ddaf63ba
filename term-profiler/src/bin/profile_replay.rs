//! Replays recorded measure snapshots through the statistical profiler.
//!
//! Reads one JSON object of measure values per line from stdin and prints
//! the measures and anomaly score of each, in arrival order. A line that is
//! not a snapshot stops the replay.
//!
//! ```text
//! profile-replay [config.json] < snapshots.jsonl
//! ```
//!
//! Logs go to stderr; `TERM_PROFILER_LOG_FORMAT` selects `full`, `compact`
//! or `json`.

use term_profiler::logging::setup::{init_logging, LoggingConfig};
use term_profiler::profiling::{replay_lines, ConsoleSink, ProfilerConfig, StatisticalProfiler};
use tokio::io::BufReader;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LoggingConfig::from_env()?)?;

    let config = match std::env::args().nth(1) {
        Some(path) => ProfilerConfig::from_json_file(&path)?,
        None => ProfilerConfig::default(),
    };
    info!(window_size = config.window_size, order = ?config.scoring_order, "Starting replay");

    let mut profiler = StatisticalProfiler::new(config)?.with_sink(ConsoleSink::stdout());
    replay_lines(BufReader::new(tokio::io::stdin()), &mut profiler).await?;
    Ok(())
}
