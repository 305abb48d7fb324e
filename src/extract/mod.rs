//! Core-set extraction: which OTUs are consistently present in the
//! interest group.

mod presence;

pub use presence::{core_hits, core_set, is_core, summarize, summarize_row};
