//! JSON lines sink: one parseable record per run, appended across opens.

use crate::common::noisy_copies;
use nnbench::config::RunSettings;
use nnbench::{BenchmarkEngine, JsonLinesSink, ResultSink, RunMetadata, RunReport, ScanResult};
use tempfile::TempDir;

fn read_reports(path: &std::path::Path) -> Vec<RunReport> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn test_records_are_appended_across_opens() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("results.jsonl");
    let dataset = noisy_copies(50, 5, 8);

    let (baseline, report) = BenchmarkEngine::new(RunSettings {
        filter: true,
        ..RunSettings::default()
    })
    .run_with_baseline(&dataset.data, &dataset.queries, "synthetic")
    .unwrap();

    {
        let mut sink = JsonLinesSink::open(&path).unwrap();
        assert_eq!(sink.path(), path.as_path());
        sink.record(&baseline).unwrap();
    }
    {
        let mut sink = JsonLinesSink::open(&path).unwrap();
        sink.record(&report).unwrap();
    }

    let reports = read_reports(&path);
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0], baseline);
    assert_eq!(reports[1], report);
    assert_eq!(reports[1].metadata.components, "filter_float32_scalar");
}

#[test]
fn test_record_json_shape() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("results.jsonl");
    let dataset = noisy_copies(20, 3, 4);

    let report = BenchmarkEngine::new(RunSettings::default())
        .run(&dataset.data, &dataset.queries, "synthetic")
        .unwrap();
    JsonLinesSink::open(&path).unwrap().record(&report).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(value["metadata"]["dataset"], "synthetic");
    assert_eq!(value["metadata"]["metric"], "dot_product");
    assert_eq!(value["metadata"]["run_id"].as_str().unwrap().len(), 64);
    assert_eq!(value["result"]["nearest"].as_array().unwrap().len(), 3);
    assert!(value.get("recall").is_none());
}

#[test]
fn test_open_fails_on_directory_path() {
    let temp_dir = TempDir::new().unwrap();
    let err = JsonLinesSink::open(temp_dir.path()).unwrap_err();
    assert!(matches!(err, nnbench::BenchError::SinkWrite { .. }));
}

#[test]
fn test_missing_neighbor_is_recorded_as_minus_one() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("results.jsonl");
    let report = RunReport {
        metadata: RunMetadata::new(&RunSettings::default(), "synthetic"),
        result: ScanResult {
            nearest: vec![Some(2), None],
            running_time_ns: 100,
            comparisons: 1,
            total_pairs: 6,
        },
        recall: None,
    };
    JsonLinesSink::open(&path).unwrap().record(&report).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: serde_json::Value = serde_json::from_str(text.trim_end()).unwrap();
    assert_eq!(value["result"]["nearest"], serde_json::json!([2, -1]));
    assert_eq!(read_reports(&path), vec![report]);
}
