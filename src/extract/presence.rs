//! Per-OTU presence statistics under a partition.

use crate::config::CoreMode;
use crate::data::{AbundanceTable, OtuSummary, Partition, Side};
use rayon::prelude::*;
use sprs::CsVecViewI;

/// Presence counts of one OTU row.
///
/// A sample counts as present when its abundance is strictly greater than
/// `min_abundance`. Only stored (non-zero) entries are visited.
pub fn summarize_row(
    otu_index: usize,
    row: CsVecViewI<'_, f64, usize>,
    partition: &Partition,
    min_abundance: f64,
) -> OtuSummary {
    let mut interest_present = 0;
    let mut out_present = 0;
    for (col, &value) in row.iter() {
        if value <= min_abundance {
            continue;
        }
        match partition.side(col) {
            Side::Interest => interest_present += 1,
            Side::Out => out_present += 1,
            Side::Excluded => {}
        }
    }
    let interest = partition.interest_count();
    let out = partition.out_count();
    OtuSummary {
        otu_index,
        total: interest + out,
        present: interest_present + out_present,
        interest,
        interest_present,
        out,
        out_present,
    }
}

/// Presence counts of every OTU in the table.
///
/// The table is only read; a shuffled partition is all that changes between
/// permutation trials.
pub fn summarize(
    table: &AbundanceTable,
    partition: &Partition,
    min_abundance: f64,
) -> Vec<OtuSummary> {
    let data = table.data();
    (0..table.n_otus())
        .into_par_iter()
        .filter_map(|row| {
            data.outer_view(row)
                .map(|view| summarize_row(row, view, partition, min_abundance))
        })
        .collect()
}

/// Whether an OTU is core at `threshold`.
#[inline]
pub fn is_core(summary: &OtuSummary, threshold: f64, mode: CoreMode) -> bool {
    let in_core = summary.interest > 0 && summary.interest_fraction() >= threshold;
    match mode {
        CoreMode::CoreOnly => in_core,
        CoreMode::RelativeToOutGroup => in_core && summary.out_fraction() < threshold,
    }
}

/// Table rows of the OTUs that are core at `threshold`, ascending.
pub fn core_set(summaries: &[OtuSummary], threshold: f64, mode: CoreMode) -> Vec<usize> {
    summaries
        .iter()
        .filter(|s| is_core(s, threshold, mode))
        .map(|s| s.otu_index)
        .collect()
}

/// Core OTU rows at each threshold, in threshold order.
///
/// Runs once per permutation trial on a worker thread, so rows are
/// summarized sequentially.
pub fn core_hits(
    table: &AbundanceTable,
    partition: &Partition,
    min_abundance: f64,
    thresholds: &[f64],
    mode: CoreMode,
) -> Vec<Vec<usize>> {
    let summaries: Vec<OtuSummary> = table
        .row_iter()
        .enumerate()
        .map(|(row, view)| summarize_row(row, view, partition, min_abundance))
        .collect();
    thresholds
        .iter()
        .map(|&t| core_set(&summaries, t, mode))
        .collect()
}
