//! Replaying recorded JSON-lines snapshots through a profiler.

use term_profiler::prelude::*;
use term_profiler::profiling::{replay_lines, MemorySink};

fn profiler() -> (StatisticalProfiler, MemorySink) {
    let sink = MemorySink::new();
    let profiler = StatisticalProfiler::new(ProfilerConfig::default())
        .unwrap()
        .with_sink(sink.clone());
    (profiler, sink)
}

#[tokio::test]
async fn test_replay_skips_blank_lines_and_engine_columns() {
    let input = r#"{"x_mean_prof": 10, "__time__": 1000, "__diff__": 1}

{"x_mean_prof": 10, "__time__": 3000, "__diff__": 1}

{"x_mean_prof": 16, "__time__": 5000, "__diff__": 1}
"#;
    let (mut profiler, sink) = profiler();

    let consumed = replay_lines(input.as_bytes(), &mut profiler).await.unwrap();
    assert_eq!(consumed, 3);

    let scores = sink.scores().await;
    assert_eq!(scores[0], 0.0);
    // Identical measures with a moving timestamp score zero
    assert_eq!(scores[1], 0.0);
    // Mean (10 + 10 + 16) / 3 = 12, |16 - 12| / 12
    assert!((scores[2] - 1.0 / 3.0).abs() < 1e-12);

    let store = profiler.consumer().store();
    assert!(store.window("__time__").is_none());
    assert!(store.window("__diff__").is_none());
    assert!(sink
        .reports()
        .await
        .iter()
        .all(|r| !r.snapshot.contains("__time__")));
}

#[tokio::test]
async fn test_replay_stops_at_malformed_line() {
    let input = "{\"a\": 1}\n{\"a\": 2}\nnot a snapshot\n{\"a\": 3}\n";
    let (mut profiler, sink) = profiler();

    let result = replay_lines(input.as_bytes(), &mut profiler).await;
    match result {
        Err(ProfilerError::InvalidData(message)) => assert!(message.starts_with("line 3:")),
        other => panic!("expected invalid data, got {other:?}"),
    }

    // Snapshots before the bad line were consumed, none after it
    assert_eq!(profiler.consumer().processed(), 2);
    assert_eq!(sink.len().await, 2);
}

#[tokio::test]
async fn test_replay_rejects_non_numeric_value() {
    let input = "{\"a\": \"twelve\"}\n";
    let (mut profiler, _sink) = profiler();

    let result = replay_lines(input.as_bytes(), &mut profiler).await;
    assert!(matches!(result, Err(ProfilerError::InvalidData(_))));
    assert_eq!(profiler.consumer().processed(), 0);
}

#[tokio::test]
async fn test_replay_accepts_non_finite_values() {
    let input = "{\"a\": \"inf\"}\n";
    let (mut profiler, sink) = profiler();

    replay_lines(input.as_bytes(), &mut profiler).await.unwrap();
    let reports = sink.reports().await;
    assert_eq!(reports[0].snapshot.get("a"), Some(f64::INFINITY));
}
