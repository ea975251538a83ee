//! Scans through the public API, from raw rows to nearest indices.

use crate::common::{batch, noisy_copies};
use nnbench::config::RunSettings;
use nnbench::vector::{
    DistanceKernel, DotProduct, Fixed16, Float32, Float32Unaligned, KernelVariant, MetricKind,
    NoFilter, Recall, SquaredEuclidean, VectorStorage, scan, scan_parallel,
};
use nnbench::{BenchmarkEngine, VectorError};

#[test]
fn test_three_point_euclidean_scan() {
    let data = batch(&[&[0.0, 0.0], &[1.0, 1.0], &[5.0, 5.0]]);
    let queries = batch(&[&[0.9, 0.9]]);

    let data = VectorStorage::<Float32>::from_batch(&data).unwrap();
    let queries = VectorStorage::<Float32>::from_batch(&queries).unwrap();
    let kernel = DistanceKernel::<f32, SquaredEuclidean>::for_encoding::<Float32>(
        KernelVariant::Scalar,
    )
    .unwrap();

    let result = scan(&data, &queries, &kernel, &mut NoFilter).unwrap();
    assert_eq!(result.nearest, vec![Some(1)]);
    assert_eq!(result.nearest_as_i64(), vec![1]);
    assert_eq!(result.comparisons, 3);
    assert_eq!(result.total_pairs, 3);
    assert!((result.selectivity() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_unfiltered_scan_finds_source_rows() {
    let dataset = noisy_copies(500, 25, 48);
    let data = VectorStorage::<Float32Unaligned>::from_batch(&dataset.data).unwrap();
    let queries = VectorStorage::<Float32Unaligned>::from_batch(&dataset.queries).unwrap();
    let kernel = DistanceKernel::<f32, DotProduct>::for_encoding::<Float32Unaligned>(
        KernelVariant::Scalar,
    )
    .unwrap();

    let sequential = scan(&data, &queries, &kernel, &mut NoFilter).unwrap();
    let parallel = scan_parallel(&data, &queries, &kernel, &NoFilter).unwrap();

    assert_eq!(sequential.nearest.len(), 25);
    assert!(sequential.nearest.iter().all(Option::is_some));
    assert_eq!(sequential.nearest, parallel.nearest);
    assert_eq!(sequential.comparisons, 500 * 25);
}

#[test]
fn test_fixed_point_matches_float_baseline() {
    let dataset = noisy_copies(300, 20, 64);
    let baseline = BenchmarkEngine::new(RunSettings::default())
        .run(&dataset.data, &dataset.queries, "synthetic")
        .unwrap();
    let fixed = BenchmarkEngine::new(
        RunSettings::default().with_storage(nnbench::vector::StorageFormat::Fixed16),
    )
    .run(&dataset.data, &dataset.queries, "synthetic")
    .unwrap();

    // Q15 rounding can only swap near ties; noisy copies have none.
    let recall = fixed.result.recall_against(&baseline.result).unwrap();
    assert!(recall >= 0.95, "fixed16 recall was {recall}");
}

#[test]
fn test_same_seed_same_results() {
    let dataset = noisy_copies(400, 30, 32);
    let settings = RunSettings {
        filter: true,
        recall: Recall::new(0.9).unwrap(),
        seed: 17,
        ..RunSettings::default()
    };

    let first = BenchmarkEngine::new(settings.clone())
        .run(&dataset.data, &dataset.queries, "synthetic")
        .unwrap();
    let second = BenchmarkEngine::new(settings)
        .run(&dataset.data, &dataset.queries, "synthetic")
        .unwrap();

    assert_eq!(first.result.nearest, second.result.nearest);
    assert_eq!(first.result.comparisons, second.result.comparisons);
}

#[test]
fn test_mismatched_storages_are_rejected() {
    let data = VectorStorage::<Fixed16>::from_batch(&batch(&[&[1.0, 0.0, 0.0]])).unwrap();
    let queries = VectorStorage::<Fixed16>::from_batch(&batch(&[&[1.0, 0.0]])).unwrap();
    let kernel =
        DistanceKernel::<i16, DotProduct>::for_encoding::<Fixed16>(KernelVariant::Scalar).unwrap();

    let err = scan(&data, &queries, &kernel, &mut NoFilter).unwrap_err();
    assert!(matches!(err, VectorError::DimensionMismatch { .. }));
    assert_eq!(kernel.metric(), MetricKind::DotProduct);
}
