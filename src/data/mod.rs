//! Data structures for core-microbiome analysis.

mod abundance_table;
mod group_mapping;
mod report;
mod result;

pub use abundance_table::{AbundanceTable, IngestSummary};
pub use group_mapping::{GroupMapping, Partition, Side};
pub use report::CoreReport;
pub use result::{OtuSummary, SignificanceResult};
