//! End-to-end analysis runs.

mod runner;

pub use runner::{analyze_files, Analysis};
