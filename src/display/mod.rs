//! Rich terminal display utilities for benchmark output.
//!
//! Provides styled tables and progress bars for the command-line front end.

pub mod progress;
pub mod tables;

pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{TableBuilder, create_kernel_table, create_run_table};
