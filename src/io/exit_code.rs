//! Exit codes for CLI operations following Unix conventions.
//!
//! # Exit Code Semantics
//!
//! - `0`: Success - all requested runs completed
//! - `1`: General error - unspecified failure
//! - `2`: Blocking error - the benchmark cannot run on this machine as configured
//! - `3-125`: Specific recoverable errors
//! - `126-255`: Reserved by shell

use crate::error::BenchError;
use crate::vector::VectorError;

/// Standard exit codes for CLI operations.
///
/// These codes follow Unix conventions where 0 indicates success,
/// and non-zero values indicate various error conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Operation succeeded (code 0)
    Success = 0,

    /// Unspecified error occurred (code 1)
    GeneralError = 1,

    /// Critical error that should halt automation (code 2)
    BlockingError = 2,

    /// Requested experiment does not exist (code 3)
    NotFound = 3,

    /// Input vectors violate a precondition (code 4)
    InvalidInput = 4,

    /// File I/O error (code 5)
    IoError = 5,

    /// Configuration error (code 6)
    ConfigError = 6,

    /// Operation not supported on this machine or for this combination (code 8)
    UnsupportedOperation = 8,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> i32 {
        code as i32
    }
}

impl ExitCode {
    /// Convert a `BenchError` to the appropriate exit code.
    ///
    /// Maps specific error types to semantic exit codes that scripts
    /// can use to determine appropriate recovery actions.
    pub fn from_error(error: &BenchError) -> Self {
        match error {
            BenchError::ExperimentNotFound { .. } => ExitCode::NotFound,

            BenchError::Vector(vector) => match vector {
                VectorError::UnsupportedInstructionSet { .. }
                | VectorError::UnsupportedCombination { .. } => ExitCode::UnsupportedOperation,
                VectorError::AllocationError { .. } => ExitCode::BlockingError,
                VectorError::UnknownOption { .. }
                | VectorError::InvalidRecall { .. }
                | VectorError::InvalidDimension { .. } => ExitCode::ConfigError,
                VectorError::NotNormalized { .. }
                | VectorError::DimensionMismatch { .. }
                | VectorError::CapacityExceeded { .. }
                | VectorError::IndexOutOfRange { .. } => ExitCode::InvalidInput,
            },

            BenchError::Config(_) | BenchError::SettingsExist { .. } => ExitCode::ConfigError,
            BenchError::SettingsWrite { .. } | BenchError::SinkWrite { .. } => ExitCode::IoError,

            // Everything else is a general error
            _ => ExitCode::GeneralError,
        }
    }

    /// Check if this exit code indicates a blocking error.
    ///
    /// Blocking errors should halt automation pipelines.
    #[must_use]
    pub fn is_blocking(&self) -> bool {
        matches!(self, ExitCode::BlockingError)
    }

    /// Check if this exit code indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExitCode::Success)
    }

    /// Get a human-readable description of the exit code.
    pub fn description(&self) -> &str {
        match self {
            ExitCode::Success => "Success",
            ExitCode::GeneralError => "General error",
            ExitCode::BlockingError => "Blocking error - automation should halt",
            ExitCode::NotFound => "Not found",
            ExitCode::InvalidInput => "Invalid input vectors",
            ExitCode::IoError => "I/O error",
            ExitCode::ConfigError => "Configuration error",
            ExitCode::UnsupportedOperation => "Unsupported operation",
        }
    }
}
