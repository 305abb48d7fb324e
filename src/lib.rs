//! Core Microbiome Detection Library
//!
//! Identifies the OTUs consistently present in a group of samples and scores
//! each one for significance, corrected for multiple testing.
//!
//! # Overview
//!
//! - **data**: Abundance tables, group mappings, partitions, results, reports
//! - **extract**: Per-OTU presence statistics and core sets
//! - **stats**: Exact combinatorics and the hypergeometric tail
//! - **test**: Exact and permutation significance
//! - **correct**: Multiple testing correction (Bonferroni, Holm, BH)
//! - **orchestrate**: Chunked, resumable execution of permutation trials
//! - **pipeline**: End-to-end analysis runs
//! - **config**: Run configuration, loadable from YAML
//!
//! # Example
//!
//! ```no_run
//! use coremic::prelude::*;
//!
//! let config = RunConfig {
//!     min_presence_fraction: 0.75,
//!     ..RunConfig::new("Treatment", &["Control"])
//! };
//! let reports = analyze_files("otu_table.tsv", "mapping.tsv", &config).unwrap();
//! for report in &reports {
//!     println!("{}", report);
//! }
//! ```

pub mod config;
pub mod correct;
pub mod data;
pub mod error;
pub mod extract;
pub mod orchestrate;
pub mod pipeline;
pub mod stats;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::config::{CoreMode, ExecutionConfig, RunConfig, ZeroOccurrence};
    pub use crate::correct::{correct_pvalues, CorrectionMethod, Corrected};
    pub use crate::data::{
        AbundanceTable, CoreReport, GroupMapping, IngestSummary, OtuSummary, Partition, Side,
        SignificanceResult,
    };
    pub use crate::error::{CoremicError, Result};
    pub use crate::extract::{core_set, summarize};
    pub use crate::orchestrate::{
        BatchStore, FileStore, JobDispatcher, LocalQueue, MemoryStore, Orchestrator, RunOutcome,
        TrialRunner,
    };
    pub use crate::pipeline::{analyze_files, Analysis};
    pub use crate::stats::{hypergeometric_tail, n_choose_r};
    pub use crate::test::{permutation_results, test_exact, PermutationEngine};
}
