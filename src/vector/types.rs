//! Type-safe wrappers and core types for vector storage and search.
//!
//! This module provides newtypes and error types for the scan core. All
//! types implement the traits needed for ergonomic usage while keeping raw
//! integers and floats from leaking across module boundaries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Type-safe wrapper for the nominal dimensionality of a vector.
///
/// This is the number of meaningful values per vector, before any padding
/// applied by the storage encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl TryFrom<usize> for VectorDimension {
    type Error = VectorError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VectorDimension> for usize {
    fn from(dim: VectorDimension) -> usize {
        dim.0
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shape of the vectors held by a storage: nominal and padded length.
///
/// Consumers such as the sketch filter use this to size their own buffers
/// without touching the raw storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StorageDescription {
    /// Number of meaningful values per vector.
    pub args: VectorDimension,
    /// Number of scalars per stored row, including zero padding.
    pub storage_len: usize,
}

/// Target recall of the sketch filter, strictly inside (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Recall(f32);

impl Recall {
    /// Creates a new `Recall` with validation.
    ///
    /// Returns an error if the value is NaN or outside the open interval (0, 1).
    pub fn new(value: f32) -> Result<Self, VectorError> {
        if value.is_nan() || value <= 0.0 || value >= 1.0 {
            return Err(VectorError::InvalidRecall { value });
        }
        Ok(Self(value))
    }

    /// Returns the underlying fraction.
    #[must_use]
    pub const fn get(&self) -> f32 {
        self.0
    }
}

impl Default for Recall {
    fn default() -> Self {
        Self(0.9)
    }
}

impl TryFrom<f32> for Recall {
    type Error = VectorError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Recall> for f32 {
    fn from(recall: Recall) -> f32 {
        recall.0
    }
}

impl std::fmt::Display for Recall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur in vector storage, kernels, filters and scans.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Failed to allocate {bytes} bytes with alignment {alignment}: {reason}\nSuggestion: Reduce the data set size or check available memory"
    )]
    AllocationError {
        bytes: usize,
        alignment: usize,
        reason: String,
    },

    #[error(
        "Vector storage is full (capacity {capacity})\nSuggestion: Create the storage with a capacity matching the batch size"
    )]
    CapacityExceeded { capacity: usize },

    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure data and query batches share the same dimensionality"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error(
        "Vector index {index} out of range for storage holding {size} vectors\nSuggestion: Only access indices below the number of inserted vectors"
    )]
    IndexOutOfRange { index: usize, size: usize },

    #[error(
        "Kernel variant '{variant}' requires {instruction_set}, which is not available on this machine\nSuggestion: Use the 'scalar' kernel variant or set run.on_unsupported = \"fallback\""
    )]
    UnsupportedInstructionSet {
        variant: &'static str,
        instruction_set: &'static str,
    },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Invalid recall target: {value}\nSuggestion: Choose a recall strictly between 0.0 and 1.0"
    )]
    InvalidRecall { value: f32 },

    #[error(
        "{set} vector {index} is not unit-normalized (norm {norm}, tolerance {tolerance})\nSuggestion: L2-normalize vectors before enabling the sketch filter"
    )]
    NotNormalized {
        set: &'static str,
        index: usize,
        norm: f32,
        tolerance: f32,
    },

    #[error(
        "Metric '{metric}' is not available for encoding '{encoding}'\nSuggestion: Use the dot_product metric with fixed-point storage"
    )]
    UnsupportedCombination {
        metric: &'static str,
        encoding: &'static str,
    },

    #[error("Unknown {kind} '{value}'\nSuggestion: Valid values are: {expected}")]
    UnknownOption {
        kind: &'static str,
        value: String,
        expected: String,
    },
}
