//! Error types for the benchmark harness
//!
//! This module provides structured error types using thiserror for better
//! error handling and actionable error messages. Core failures from storage,
//! kernels and scans are carried as [`VectorError`]; everything the harness
//! adds around them (configuration, result sinks, thread pools) lives here.

use std::path::PathBuf;
use thiserror::Error;

use crate::vector::VectorError;

/// Main error type for benchmark runs
#[derive(Error, Debug)]
pub enum BenchError {
    /// Storage, kernel, filter or scan failure
    #[error(transparent)]
    Vector(#[from] VectorError),

    /// Configuration errors
    #[error(
        "Failed to load configuration: {0}\nSuggestion: Check .nnbench/settings.toml and NNB_* environment variables"
    )]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration file '{path}' already exists\nSuggestion: Use --force to overwrite")]
    SettingsExist { path: PathBuf },

    #[error("Failed to write settings to '{path}': {source}")]
    SettingsWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Result sink errors
    #[error("Failed to write results to '{path}': {source}")]
    SinkWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize run report: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Experiment '{name}' is not defined\nSuggestion: Run 'nnbench config' to list configured experiments")]
    ExperimentNotFound { name: String },

    #[error("Failed to build thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl BenchError {
    /// Get a stable status code for this error type.
    ///
    /// Returns a string identifier that can be used in JSON output
    /// for programmatic error handling.
    pub fn status_code(&self) -> String {
        match self {
            Self::Vector(e) => match e {
                VectorError::AllocationError { .. } => "ALLOCATION_ERROR",
                VectorError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
                VectorError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
                VectorError::IndexOutOfRange { .. } => "INDEX_OUT_OF_RANGE",
                VectorError::UnsupportedInstructionSet { .. } => "UNSUPPORTED_INSTRUCTION_SET",
                VectorError::InvalidDimension { .. } => "INVALID_DIMENSION",
                VectorError::InvalidRecall { .. } => "INVALID_RECALL",
                VectorError::NotNormalized { .. } => "NOT_NORMALIZED",
                VectorError::UnsupportedCombination { .. } => "UNSUPPORTED_COMBINATION",
                VectorError::UnknownOption { .. } => "UNKNOWN_OPTION",
            },
            Self::Config(_) => "CONFIG_ERROR",
            Self::SettingsExist { .. } => "SETTINGS_EXIST",
            Self::SettingsWrite { .. } => "SETTINGS_WRITE_ERROR",
            Self::TomlSerialize(_) => "TOML_SERIALIZE_ERROR",
            Self::SinkWrite { .. } => "SINK_WRITE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::ExperimentNotFound { .. } => "EXPERIMENT_NOT_FOUND",
            Self::ThreadPool(_) => "THREAD_POOL_ERROR",
        }
        .to_string()
    }

    /// Get recovery suggestions for this error
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Vector(VectorError::UnsupportedInstructionSet { .. }) => vec![
                "Run 'nnbench kernels' to see which variants this machine supports",
                "Set run.on_unsupported = \"fallback\" to degrade to the scalar kernel",
            ],
            Self::Vector(VectorError::NotNormalized { .. }) => vec![
                "L2-normalize data and queries before enabling the sketch filter",
                "Raise sketch.normalization_tolerance if the vectors are quantized",
            ],
            Self::Vector(VectorError::AllocationError { .. }) => vec![
                "Reduce dataset.data_count or dataset.dimension",
                "Check available memory",
            ],
            Self::Config(_) => vec![
                "Run 'nnbench init --force' to regenerate a valid settings file",
                "Check NNB_* environment variables for typos",
            ],
            Self::SinkWrite { .. } | Self::SettingsWrite { .. } => vec![
                "Check that the parent directory exists and is writable",
                "Ensure the file is not locked by another process",
            ],
            _ => vec![],
        }
    }

    /// Terminal report: status code, `message` and one line per suggestion.
    ///
    /// `message` is the full rendered chain, which may carry context added
    /// above this error.
    pub fn render_report(&self, message: &str) -> String {
        let mut report = format!("Error [{}]: {message}", self.status_code());
        for suggestion in self.recovery_suggestions() {
            report.push_str("\n  - ");
            report.push_str(suggestion);
        }
        report
    }
}

/// Result type alias for benchmark operations
pub type BenchResult<T> = Result<T, BenchError>;
