//! Settings file to finished runs: the path `nnbench matrix` takes.

use nnbench::config::UnsupportedPolicy;
use nnbench::vector::{KernelVariant, MetricKind, StorageFormat, SyntheticDataset};
use nnbench::{BenchmarkEngine, MemorySink, ResultSink, Settings};
use tempfile::TempDir;

const SETTINGS: &str = r#"
[run]
on_unsupported = "fallback"
seed = 3

[dataset]
data_count = 120
query_count = 6
dimension = 20
noise = 0.05
seed = 11

[[experiments]]
name = "small"
metric = "dot_product"
storages = ["float32", "fixed16_unaligned"]
kernels = ["scalar", "simd_b"]
filter = true
recalls = [0.5, 0.95]

[[experiments]]
name = "euclid"
metric = "euclidean"
storages = ["float32_unaligned", "fixed16"]
kernels = ["scalar"]
"#;

fn load(temp_dir: &TempDir) -> Settings {
    let path = temp_dir.path().join("settings.toml");
    std::fs::write(&path, SETTINGS).unwrap();
    Settings::load_from(&path).unwrap()
}

#[test]
fn test_experiment_matrix_runs_to_sink() {
    let temp_dir = TempDir::new().unwrap();
    let settings = load(&temp_dir);
    assert_eq!(settings.run.on_unsupported, UnsupportedPolicy::Fallback);
    assert_eq!(settings.experiments.len(), 2);

    let ds = &settings.dataset;
    let dataset = SyntheticDataset::generate(
        ds.data_count,
        ds.query_count,
        ds.dimension,
        ds.noise,
        ds.seed,
    )
    .unwrap();

    let runs = settings.experiment("small").unwrap().expand(&settings.run);
    assert_eq!(runs.len(), 2 * 2 * 2);

    let mut sink = MemorySink::new();
    for run in runs {
        let engine = BenchmarkEngine::new(run)
            .with_normalization_tolerance(settings.sketch.normalization_tolerance);
        let (_, report) = engine
            .run_with_baseline(&dataset.data, &dataset.queries, &ds.name)
            .unwrap();
        sink.record(&report).unwrap();
    }

    let reports = sink.into_reports();
    assert_eq!(reports.len(), 8);
    for report in &reports {
        assert!(report.metadata.filter);
        assert_eq!(report.metadata.seed, 3);
        assert_eq!(report.result.nearest.len(), 6);
        // Fallback may have replaced simd_b with scalar
        assert!(matches!(
            report.metadata.kernel,
            KernelVariant::Scalar | KernelVariant::SimdB
        ));
    }
    assert!(
        reports
            .iter()
            .any(|r| r.metadata.storage == StorageFormat::Fixed16Unaligned)
    );
}

#[test]
fn test_euclidean_matrix_skips_fixed_point() {
    let temp_dir = TempDir::new().unwrap();
    let settings = load(&temp_dir);
    let experiment = settings.experiment("euclid").unwrap();
    assert_eq!(experiment.metric, MetricKind::Euclidean);

    let runs = experiment.expand(&settings.run);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].storage_format(), StorageFormat::Float32Unaligned);
    assert!(!runs[0].filter);
}

#[test]
fn test_unknown_experiment() {
    let temp_dir = TempDir::new().unwrap();
    let settings = load(&temp_dir);
    let err = settings.experiment("missing").unwrap_err();
    assert!(matches!(err, nnbench::BenchError::ExperimentNotFound { .. }));
}

#[test]
fn test_init_then_load_round_trips_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
    let loaded = Settings::load_from(&path).unwrap();
    assert_eq!(loaded.run, Settings::default().run);
    assert!(Settings::init_config_file(temp_dir.path(), false).is_err());
    assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
}
