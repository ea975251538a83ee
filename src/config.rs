//! Configuration module for the benchmark harness.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//! - CLI argument overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `NNB_` and use double underscores
//! to separate nested levels:
//! - `NNB_RUN__SEED=7` sets `run.seed`
//! - `NNB_RUN__KERNEL=simd_a` sets `run.kernel`
//! - `NNB_DATASET__DATA_COUNT=50000` sets `dataset.data_count`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{BenchError, BenchResult};
use crate::vector::{
    Alignment, EncodingKind, KernelVariant, MetricKind, Recall, StorageFormat,
};

/// Directory holding the settings file and default results.
pub const CONFIG_DIR: &str = ".nnbench";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Single-run parameters
    #[serde(default)]
    pub run: RunSettings,

    /// Synthetic dataset parameters
    #[serde(default)]
    pub dataset: DatasetSettings,

    /// Sketch filter parameters
    #[serde(default)]
    pub sketch: SketchSettings,

    /// Result recording
    #[serde(default)]
    pub output: OutputSettings,

    #[serde(default)]
    pub logging: LoggingSettings,

    /// Experiment matrices run by `nnbench matrix`
    #[serde(default = "default_experiments")]
    pub experiments: Vec<ExperimentSettings>,
}

/// What to do when a SIMD kernel variant cannot run on this machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedPolicy {
    /// Fail the run with `UnsupportedInstructionSet`
    #[default]
    Abort,
    /// Run the scalar variant instead and log a warning
    Fallback,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RunSettings {
    #[serde(default)]
    pub metric: MetricKind,

    #[serde(default)]
    pub encoding: EncodingKind,

    #[serde(default)]
    pub alignment: Alignment,

    #[serde(default)]
    pub kernel: KernelVariant,

    /// Enable the sketch pre-filter
    #[serde(default = "default_false")]
    pub filter: bool,

    /// Target recall of the sketch filter, in (0, 1)
    #[serde(default)]
    pub recall: Recall,

    /// Seed for the sketch hash vectors
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Scan queries on a rayon pool
    #[serde(default = "default_false")]
    pub parallel: bool,

    /// Threads for the parallel scan
    #[serde(default = "default_threads")]
    pub threads: usize,

    #[serde(default)]
    pub on_unsupported: UnsupportedPolicy,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DatasetSettings {
    /// Name recorded in run metadata
    #[serde(default = "default_dataset_name")]
    pub name: String,

    #[serde(default = "default_data_count")]
    pub data_count: usize,

    #[serde(default = "default_query_count")]
    pub query_count: usize,

    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Standard deviation of the noise added to query source rows
    #[serde(default = "default_noise")]
    pub noise: f32,

    #[serde(default = "default_dataset_seed")]
    pub seed: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SketchSettings {
    /// Accepted deviation of vector norms from 1
    #[serde(default = "default_normalization_tolerance")]
    pub normalization_tolerance: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct OutputSettings {
    /// JSON lines file receiving one record per run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results_path: Option<PathBuf>,

    /// Print a summary table after each command
    #[serde(default = "default_true")]
    pub print_table: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LoggingSettings {
    /// One of trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// A matrix of runs: every storage format x kernel variant (x recall when filtered).
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExperimentSettings {
    pub name: String,

    #[serde(default)]
    pub metric: MetricKind,

    #[serde(default = "default_storages")]
    pub storages: Vec<StorageFormat>,

    #[serde(default = "default_kernels")]
    pub kernels: Vec<KernelVariant>,

    #[serde(default = "default_false")]
    pub filter: bool,

    /// Recall targets; only used when `filter` is set
    #[serde(default)]
    pub recalls: Vec<Recall>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_seed() -> u64 {
    0
}
fn default_threads() -> usize {
    num_cpus::get()
}
fn default_dataset_name() -> String {
    "synthetic".to_string()
}
fn default_data_count() -> usize {
    10_000
}
fn default_query_count() -> usize {
    100
}
fn default_dimension() -> usize {
    128
}
fn default_noise() -> f32 {
    0.05
}
fn default_dataset_seed() -> u64 {
    1
}
fn default_normalization_tolerance() -> f32 {
    crate::vector::DEFAULT_NORMALIZATION_TOLERANCE
}
fn default_results_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("results.jsonl")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_storages() -> Vec<StorageFormat> {
    StorageFormat::ALL.to_vec()
}
fn default_kernels() -> Vec<KernelVariant> {
    KernelVariant::ALL.to_vec()
}

fn default_experiments() -> Vec<ExperimentSettings> {
    let recalls = [0.5, 0.8, 0.9, 0.95, 0.99]
        .into_iter()
        .filter_map(|r| Recall::new(r).ok())
        .collect();

    vec![
        ExperimentSettings {
            name: "kernels".to_string(),
            metric: MetricKind::DotProduct,
            storages: default_storages(),
            kernels: default_kernels(),
            filter: false,
            recalls: Vec::new(),
        },
        ExperimentSettings {
            name: "sketches".to_string(),
            metric: MetricKind::DotProduct,
            storages: vec![StorageFormat::Float32, StorageFormat::Fixed16],
            kernels: vec![KernelVariant::Scalar],
            filter: true,
            recalls,
        },
    ]
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            run: RunSettings::default(),
            dataset: DatasetSettings::default(),
            sketch: SketchSettings::default(),
            output: OutputSettings::default(),
            logging: LoggingSettings::default(),
            experiments: default_experiments(),
        }
    }
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            metric: MetricKind::default(),
            encoding: EncodingKind::default(),
            alignment: Alignment::default(),
            kernel: KernelVariant::default(),
            filter: false,
            recall: Recall::default(),
            seed: default_seed(),
            parallel: false,
            threads: default_threads(),
            on_unsupported: UnsupportedPolicy::default(),
        }
    }
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            name: default_dataset_name(),
            data_count: default_data_count(),
            query_count: default_query_count(),
            dimension: default_dimension(),
            noise: default_noise(),
            seed: default_dataset_seed(),
        }
    }
}

impl Default for SketchSettings {
    fn default() -> Self {
        Self {
            normalization_tolerance: default_normalization_tolerance(),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            results_path: Some(default_results_path()),
            print_table: true,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RunSettings {
    /// Concrete storage format selected by `encoding` and `alignment`.
    #[must_use]
    pub fn storage_format(&self) -> StorageFormat {
        StorageFormat::from_parts(self.encoding, self.alignment)
    }

    /// Copy of these settings using `format` for storage.
    #[must_use]
    pub fn with_storage(mut self, format: StorageFormat) -> Self {
        self.encoding = format.kind();
        self.alignment = format.alignment();
        self
    }
}

impl ExperimentSettings {
    /// Expands the matrix into individual runs derived from `base`.
    ///
    /// Metric/encoding pairs without a kernel are left out.
    pub fn expand(&self, base: &RunSettings) -> Vec<RunSettings> {
        let recalls: Vec<Option<Recall>> = if self.filter {
            if self.recalls.is_empty() {
                vec![Some(base.recall)]
            } else {
                self.recalls.iter().copied().map(Some).collect()
            }
        } else {
            vec![None]
        };

        let mut runs = Vec::new();
        for &storage in &self.storages {
            if let Err(e) = self.metric.check_encoding(storage.kind()) {
                debug!(experiment = %self.name, storage = %storage, "Skipping: {e}");
                continue;
            }
            for &kernel in &self.kernels {
                for recall in &recalls {
                    let mut run = base.clone().with_storage(storage);
                    run.metric = self.metric;
                    run.kernel = kernel;
                    run.filter = self.filter;
                    if let Some(recall) = recall {
                        run.recall = *recall;
                    }
                    runs.push(run);
                }
            }
        }
        runs
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> BenchResult<Self> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Find the workspace config by looking for the .nnbench directory
    /// Searches from current directory up to root
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        for ancestor in current.ancestors() {
            let config_dir = ancestor.join(CONFIG_DIR);
            if config_dir.is_dir() {
                return Some(config_dir.join("settings.toml"));
            }
        }

        None
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> BenchResult<Self> {
        debug!(path = %path.as_ref().display(), "Loading settings");
        Figment::new()
            // Start with defaults
            .merge(Serialized::defaults(Settings::default()))
            // Layer in config file if it exists
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels, single underscore stays
            .merge(Env::prefixed("NNB_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(|e| BenchError::Config(Box::new(e)))
    }

    /// Render the settings as pretty TOML
    pub fn to_toml(&self) -> BenchResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> BenchResult<()> {
        let path = path.as_ref();
        let write_err = |source| BenchError::SettingsWrite {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, self.to_toml()?).map_err(write_err)?;
        Ok(())
    }

    /// Create a default settings file with a short header
    pub fn init_config_file(dir: impl AsRef<Path>, force: bool) -> BenchResult<PathBuf> {
        let config_path = dir.as_ref().join(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err(BenchError::SettingsExist { path: config_path });
        }

        let header = "# nnbench configuration\n\
                      # Environment overrides: NNB_<SECTION>__<KEY>, e.g. NNB_RUN__SEED=7\n\n";
        let body = Settings::default().to_toml()?;

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| BenchError::SettingsWrite {
                path: config_path.clone(),
                source,
            })?;
        }
        std::fs::write(&config_path, format!("{header}{body}")).map_err(|source| {
            BenchError::SettingsWrite {
                path: config_path.clone(),
                source,
            }
        })?;

        Ok(config_path)
    }

    /// Look up an experiment by name
    pub fn experiment(&self, name: &str) -> BenchResult<&ExperimentSettings> {
        self.experiments
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| BenchError::ExperimentNotFound {
                name: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.version, 1);
        assert_eq!(settings.run.metric, MetricKind::DotProduct);
        assert_eq!(settings.run.kernel, KernelVariant::Scalar);
        assert_eq!(settings.run.storage_format(), StorageFormat::Float32);
        assert_eq!(settings.run.on_unsupported, UnsupportedPolicy::Abort);
        assert!(settings.run.threads > 0);
        assert_eq!(settings.experiments.len(), 2);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        let toml_content = r#"
version = 2

[run]
metric = "euclidean"
alignment = "unaligned"
kernel = "simd_a"
filter = true
recall = 0.75
on_unsupported = "fallback"

[dataset]
dimension = 64

[[experiments]]
name = "custom"
storages = ["fixed16"]
kernels = ["scalar"]
"#;

        fs::write(&config_path, toml_content).unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.version, 2);
        assert_eq!(settings.run.metric, MetricKind::Euclidean);
        assert_eq!(settings.run.storage_format(), StorageFormat::Float32Unaligned);
        assert_eq!(settings.run.kernel, KernelVariant::SimdA);
        assert!(settings.run.filter);
        assert_eq!(settings.run.recall.get(), 0.75);
        assert_eq!(settings.run.on_unsupported, UnsupportedPolicy::Fallback);
        assert_eq!(settings.dataset.dimension, 64);
        // Experiments from the file replace the defaults
        assert_eq!(settings.experiments.len(), 1);
        assert_eq!(settings.experiments[0].metric, MetricKind::DotProduct);
    }

    #[test]
    fn test_invalid_values_fail_extraction() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[run]\nkernel = \"avx9000\"\n").unwrap();
        assert!(matches!(
            Settings::load_from(&config_path),
            Err(BenchError::Config(_))
        ));

        fs::write(&config_path, "[run]\nrecall = 1.0\n").unwrap();
        assert!(Settings::load_from(&config_path).is_err());
    }

    #[test]
    fn test_save_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::default();
        settings.run.seed = 1234;
        settings.run.parallel = true;
        settings.output.results_path = None;

        settings.save(&config_path).unwrap();

        let loaded = Settings::load_from(&config_path).unwrap();
        assert_eq!(loaded.run.seed, 1234);
        assert!(loaded.run.parallel);
    }

    #[test]
    fn test_partial_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");

        fs::write(&config_path, "[dataset]\ndata_count = 500\n").unwrap();

        let settings = Settings::load_from(&config_path).unwrap();
        assert_eq!(settings.dataset.data_count, 500);
        // Default values should still be present
        assert_eq!(settings.dataset.query_count, 100);
        assert_eq!(settings.logging.level, "info");
        assert_eq!(settings.experiments.len(), 2);
    }

    #[test]
    fn test_env_overrides_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("settings.toml");
        fs::write(
            &config_path,
            "[sketch]\nnormalization_tolerance = 0.5\n\n[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        // Only this test touches this variable
        unsafe {
            std::env::set_var("NNB_SKETCH__NORMALIZATION_TOLERANCE", "0.25");
        }

        let settings = Settings::load_from(&config_path).unwrap();

        unsafe {
            std::env::remove_var("NNB_SKETCH__NORMALIZATION_TOLERANCE");
        }

        // Environment variable should override config file
        assert_eq!(settings.sketch.normalization_tolerance, 0.25);
        // Config file value should be used when no env var
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn test_init_config_file() {
        let temp_dir = TempDir::new().unwrap();

        let path = Settings::init_config_file(temp_dir.path(), false).unwrap();
        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("# nnbench configuration"));

        let loaded = Settings::load_from(&path).unwrap();
        assert_eq!(loaded.dataset, DatasetSettings::default());

        assert!(matches!(
            Settings::init_config_file(temp_dir.path(), false),
            Err(BenchError::SettingsExist { .. })
        ));
        assert!(Settings::init_config_file(temp_dir.path(), true).is_ok());
    }

    #[test]
    fn test_experiment_expansion() {
        let base = RunSettings::default();

        let kernels = ExperimentSettings {
            name: "k".to_string(),
            metric: MetricKind::DotProduct,
            storages: StorageFormat::ALL.to_vec(),
            kernels: KernelVariant::ALL.to_vec(),
            filter: false,
            recalls: vec![Recall::new(0.5).unwrap()],
        };
        let runs = kernels.expand(&base);
        assert_eq!(runs.len(), 12);
        assert!(runs.iter().all(|r| !r.filter));

        let sketches = ExperimentSettings {
            name: "s".to_string(),
            metric: MetricKind::DotProduct,
            storages: vec![StorageFormat::Fixed16],
            kernels: vec![KernelVariant::Scalar],
            filter: true,
            recalls: vec![Recall::new(0.5).unwrap(), Recall::new(0.9).unwrap()],
        };
        let runs = sketches.expand(&base);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].recall.get(), 0.9);
        assert_eq!(runs[0].storage_format(), StorageFormat::Fixed16);
    }

    #[test]
    fn test_expansion_skips_euclidean_fixed_point() {
        let experiment = ExperimentSettings {
            name: "e".to_string(),
            metric: MetricKind::Euclidean,
            storages: StorageFormat::ALL.to_vec(),
            kernels: vec![KernelVariant::Scalar],
            filter: false,
            recalls: Vec::new(),
        };
        let runs = experiment.expand(&RunSettings::default());
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.encoding == EncodingKind::Float32));
    }

    #[test]
    fn test_experiment_lookup() {
        let settings = Settings::default();
        assert!(settings.experiment("sketches").is_ok());
        assert!(matches!(
            settings.experiment("nope"),
            Err(BenchError::ExperimentNotFound { .. })
        ));
    }
}
