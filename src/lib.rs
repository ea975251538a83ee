//! The main library module for nnbench
//!
//! Benchmarks exact and sketch-filtered brute-force nearest-neighbor search
//! over alignment-padded vector storage with scalar and SIMD distance kernels.

pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod io;
pub mod report;
pub mod vector;

// Explicit exports for better API clarity
pub use config::Settings;
pub use engine::BenchmarkEngine;
pub use error::{BenchError, BenchResult};
pub use report::{JsonLinesSink, MemorySink, ResultSink, RunMetadata, RunReport};
pub use vector::{ScanResult, VectorError, VectorStorage};
