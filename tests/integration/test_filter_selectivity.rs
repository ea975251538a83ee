//! Sketch filter behavior on noisy-copy datasets: admitted fraction and
//! recall against the exact scan at different recall targets.

use crate::common::{batch, noisy_copies};
use nnbench::config::RunSettings;
use nnbench::vector::{EncodingKind, Recall, VectorError};
use nnbench::{BenchError, BenchmarkEngine, RunReport};

fn filtered_run(recall: f32, parallel: bool, encoding: EncodingKind) -> RunReport {
    let dataset = noisy_copies(2000, 50, 32);
    let engine = BenchmarkEngine::new(RunSettings {
        encoding,
        filter: true,
        recall: Recall::new(recall).unwrap(),
        parallel,
        threads: 2,
        ..RunSettings::default()
    });
    let (_, report) = engine
        .run_with_baseline(&dataset.data, &dataset.queries, "synthetic")
        .unwrap();
    report
}

#[test]
fn test_unfiltered_selectivity_is_one() {
    let dataset = noisy_copies(200, 10, 16);
    let report = BenchmarkEngine::new(RunSettings::default())
        .run(&dataset.data, &dataset.queries, "synthetic")
        .unwrap();
    assert_eq!(report.result.comparisons, report.result.total_pairs);
    assert!((report.result.selectivity() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_low_recall_target_prunes_more() {
    let strict = filtered_run(0.99, false, EncodingKind::Float32);
    let loose = filtered_run(0.1, false, EncodingKind::Float32);

    let strict_selectivity = strict.result.selectivity();
    let loose_selectivity = loose.result.selectivity();
    assert!(strict_selectivity < 1.0);
    assert!(loose_selectivity < 0.5, "selectivity was {loose_selectivity}");
    assert!(
        loose_selectivity <= strict_selectivity,
        "loose {loose_selectivity} vs strict {strict_selectivity}"
    );

    let recall = strict.recall.unwrap();
    assert!(recall >= 0.8, "recall at 0.99 target was {recall}");
}

#[test]
fn test_parallel_filter_keeps_recall() {
    let report = filtered_run(0.99, true, EncodingKind::Float32);
    assert!(report.metadata.parallel);
    assert!(report.result.selectivity() < 1.0);
    let recall = report.recall.unwrap();
    assert!(recall >= 0.8, "parallel recall was {recall}");
}

#[test]
fn test_fixed_point_filter_keeps_recall() {
    let report = filtered_run(0.99, false, EncodingKind::Fixed16);
    assert_eq!(report.metadata.components, "filter_fixed16_scalar");
    let recall = report.recall.unwrap();
    assert!(recall >= 0.8, "fixed16 recall was {recall}");
}

#[test]
fn test_filter_rejects_unnormalized_input() {
    let data = batch(&[&[3.0, 4.0], &[0.6, 0.8]]);
    let engine = BenchmarkEngine::new(RunSettings {
        filter: true,
        ..RunSettings::default()
    });

    let err = engine.run(&data, &data, "tiny").unwrap_err();
    assert!(matches!(
        err,
        BenchError::Vector(VectorError::NotNormalized { index: 0, .. })
    ));
}
