//! Input/Output handling for the command-line front end.
//!
//! This module provides consistent exit codes derived from [`BenchError`](crate::error::BenchError).

pub mod exit_code;

pub use exit_code::ExitCode;
