//! Run metadata, run reports and result sinks.
//!
//! Every run produces a [`RunReport`]: identifying metadata, the raw
//! [`ScanResult`] and, when a baseline was computed, the recall against it.
//! Reports are handed to a [`ResultSink`]; persistence beyond JSON lines is
//! left to whatever consumes those records.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::RunSettings;
use crate::error::{BenchError, BenchResult};
use crate::vector::{KernelVariant, MetricKind, ScanResult, StorageFormat};

/// Version of the brute-force scan loop.
pub const VERSION_BRUTE_FORCE: u32 = 1;
/// Version of the sketch filter.
pub const VERSION_FILTER: u32 = 1;
/// Version of the distance kernels.
pub const VERSION_DISTANCE: u32 = 1;
/// Version of the vector storage layout.
pub const VERSION_STORAGE: u32 = 1;

/// Versions of the measured components, bumped whenever their behavior changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentVersions {
    pub brute_force: u32,
    pub filter: u32,
    pub distance: u32,
    pub storage: u32,
}

impl Default for ComponentVersions {
    fn default() -> Self {
        Self {
            brute_force: VERSION_BRUTE_FORCE,
            filter: VERSION_FILTER,
            distance: VERSION_DISTANCE,
            storage: VERSION_STORAGE,
        }
    }
}

/// Component string of a run: `filter_` or `nofilter_`, then storage and kernel.
///
/// e.g. `nofilter_float32_simd_a`
#[must_use]
pub fn components(filter: bool, storage: StorageFormat, kernel: KernelVariant) -> String {
    let prefix = if filter { "filter" } else { "nofilter" };
    format!("{prefix}_{storage}_{kernel}")
}

/// Host name from `HOST_HOSTNAME`, then `HOSTNAME`, else `NULL`.
#[must_use]
pub fn hostname() -> String {
    ["HOST_HOSTNAME", "HOSTNAME"]
        .iter()
        .find_map(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "NULL".to_string())
}

/// Identifying information of one benchmark run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Hex SHA-256 over the identity fields below
    pub run_id: String,
    /// UTC timestamp with microseconds
    pub date: String,
    pub hostname: String,
    pub dataset: String,
    pub metric: MetricKind,
    pub kernel: KernelVariant,
    pub storage: StorageFormat,
    pub filter: bool,
    /// Target recall; only meaningful when `filter` is set
    pub recall: f32,
    pub seed: u64,
    pub parallel: bool,
    pub components: String,
    pub versions: ComponentVersions,
    pub crate_version: String,
}

impl RunMetadata {
    /// Metadata for a run starting now on this host.
    pub fn new(settings: &RunSettings, dataset: &str) -> Self {
        let date = Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string();
        Self::with_origin(settings, dataset, date, hostname())
    }

    /// Metadata with an explicit timestamp and host.
    pub fn with_origin(
        settings: &RunSettings,
        dataset: &str,
        date: String,
        hostname: String,
    ) -> Self {
        let storage = settings.storage_format();
        let mut metadata = Self {
            run_id: String::new(),
            date,
            hostname,
            dataset: dataset.to_string(),
            metric: settings.metric,
            kernel: settings.kernel,
            storage,
            filter: settings.filter,
            recall: settings.recall.get(),
            seed: settings.seed,
            parallel: settings.parallel,
            components: components(settings.filter, storage, settings.kernel),
            versions: ComponentVersions::default(),
            crate_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        metadata.run_id = metadata.compute_run_id();
        metadata
    }

    fn compute_run_id(&self) -> String {
        let mut hasher = Sha256::new();
        for field in [
            self.date.as_str(),
            self.hostname.as_str(),
            self.dataset.as_str(),
            self.metric.as_str(),
            self.components.as_str(),
        ] {
            hasher.update(field.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(self.recall.to_le_bytes());
        hasher.update(self.seed.to_le_bytes());
        hasher.update([u8::from(self.parallel)]);
        for version in [
            self.versions.brute_force,
            self.versions.filter,
            self.versions.distance,
            self.versions.storage,
        ] {
            hasher.update(version.to_le_bytes());
        }
        let result = hasher.finalize();
        format!("{result:x}")
    }
}

/// A finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub result: ScanResult,
    /// Recall against the exact baseline, if one was computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recall: Option<f64>,
}

/// Destination for finished runs.
pub trait ResultSink {
    fn record(&mut self, report: &RunReport) -> BenchResult<()>;
}

/// Keeps reports in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Vec<RunReport>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn reports(&self) -> &[RunReport] {
        &self.reports
    }

    pub fn into_reports(self) -> Vec<RunReport> {
        self.reports
    }
}

impl ResultSink for MemorySink {
    fn record(&mut self, report: &RunReport) -> BenchResult<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}

/// Appends one JSON record per run to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonLinesSink {
    /// Opens `path` for appending, creating it and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> BenchResult<Self> {
        let path = path.as_ref().to_path_buf();
        let sink_err = |source| BenchError::SinkWrite {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(sink_err)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(sink_err)?;

        debug!(path = %path.display(), "Opened results file");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for JsonLinesSink {
    fn record(&mut self, report: &RunReport) -> BenchResult<()> {
        serde_json::to_writer(&mut self.writer, report)?;
        self.writer
            .write_all(b"\n")
            .and_then(|()| self.writer.flush())
            .map_err(|source| BenchError::SinkWrite {
                path: self.path.clone(),
                source,
            })
    }
}
