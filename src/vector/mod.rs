//! Vector storage, distance kernels and brute-force scanning.
//!
//! This module holds the measured core of the benchmark:
//!
//! - [`VectorStorage`]: contiguous, alignment-padded rows under one [`Encoding`]
//! - [`kernels`]: scalar and SIMD distance kernels with runtime resolution
//! - [`Metric`] / [`DistanceKernel`]: metric direction plus a resolved kernel
//! - [`SketchFilter`]: SimHash candidate pre-filter with an adaptive radius
//! - [`scan`] / [`scan_parallel`]: exact or filtered nearest-neighbor scans
//!
//! # Performance Notes
//! - Kernel variants are resolved once into `fn` pointers
//! - Encodings and metrics are monomorphized; the scan loop has no runtime dispatch
//! - Sketch tables are shared between filter clones through `Arc`

mod batch;
mod encoding;
mod filter;
pub mod kernels;
mod metric;
mod scan;
mod storage;
mod types;

// Re-export core types for public API
pub use batch::{RowMajorBatch, SyntheticDataset, VectorBatch, l2_normalize};
pub use encoding::{
    Alignment, Encoding, EncodingKind, Fixed16, Fixed16Unaligned, Float32, Float32Unaligned,
    LANE_BYTES, Q15_SCALE, SIMD_ALIGNMENT, StorageFormat, pad_dimensions,
};
pub use filter::{
    CandidateFilter, DEFAULT_NORMALIZATION_TOLERANCE, NoFilter, SKETCH_BITS, SketchFilter,
    admission_radius,
};
pub use kernels::{InstructionSet, KernelVariant, LaneType};
pub use metric::{DistanceKernel, DotProduct, Metric, MetricKind, SquaredEuclidean};
pub use scan::{ScanResult, scan, scan_parallel};
pub use storage::VectorStorage;
pub use types::{Recall, StorageDescription, VectorDimension, VectorError};
