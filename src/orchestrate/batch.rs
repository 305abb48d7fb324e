//! Permutation batches and their occurrence tallies.

use crate::error::{CoremicError, Result};
use serde::{Deserialize, Serialize};

/// Lifecycle of a batch.
///
/// `Pending -> Running -> Completed`, or through `Checkpointed -> Resumed`
/// any number of times when a worker runs out of budget. A worker that sees
/// the run's cancellation flag mid-batch leaves it `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Pending,
    Running,
    Checkpointed,
    Resumed,
    Completed,
    Cancelled,
}

/// Occurrence counts per threshold per OTU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    n_otus: usize,
    /// `counts[threshold][otu]`
    counts: Vec<Vec<u64>>,
}

impl Tally {
    /// All-zero tally.
    pub fn new(n_thresholds: usize, n_otus: usize) -> Self {
        Self {
            n_otus,
            counts: vec![vec![0; n_otus]; n_thresholds],
        }
    }

    /// Add one trial's hits: for each threshold, the OTU rows that were core.
    pub fn record(&mut self, hits: &[Vec<usize>]) {
        for (counts, rows) in self.counts.iter_mut().zip(hits) {
            for &row in rows {
                counts[row] += 1;
            }
        }
    }

    /// Element-wise sum.
    pub fn merge(&mut self, other: &Tally) -> Result<()> {
        if other.shape() != self.shape() {
            return Err(CoremicError::DimensionMismatch {
                expected: self.n_thresholds() * self.n_otus,
                actual: other.n_thresholds() * other.n_otus,
            });
        }
        for (mine, theirs) in self.counts.iter_mut().zip(&other.counts) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        Ok(())
    }

    #[inline]
    pub fn count(&self, threshold_idx: usize, otu: usize) -> u64 {
        self.counts[threshold_idx][otu]
    }

    pub fn n_thresholds(&self) -> usize {
        self.counts.len()
    }

    pub fn n_otus(&self) -> usize {
        self.n_otus
    }

    /// `(thresholds, otus)`
    pub fn shape(&self) -> (usize, usize) {
        (self.n_thresholds(), self.n_otus)
    }
}

/// A contiguous range of trials owned by one worker at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermutationBatch {
    pub batch_id: usize,
    /// First trial index.
    pub start: u64,
    /// Trials in the batch.
    pub count: u64,
    /// Next trial to run. Trials before it are in `tally`.
    pub cursor: u64,
    pub tally: Tally,
    pub state: BatchState,
}

impl PermutationBatch {
    /// A batch that has not run yet.
    pub fn pending(batch_id: usize, start: u64, count: u64, tally: Tally) -> Self {
        Self {
            batch_id,
            start,
            count,
            cursor: start,
            tally,
            state: BatchState::Pending,
        }
    }

    /// One past the last trial index.
    #[inline]
    pub fn end(&self) -> u64 {
        self.start + self.count
    }

    /// Trials whose results are in the tally.
    #[inline]
    pub fn committed(&self) -> u64 {
        self.cursor - self.start
    }

    #[inline]
    pub fn remaining(&self) -> u64 {
        self.end() - self.cursor
    }
}

/// Split `total` trials into at most `workers` contiguous `(start, count)`
/// ranges. Sizes differ by at most one, larger ranges first, and no range
/// is empty.
pub fn partition_trials(total: u64, workers: usize) -> Vec<(u64, u64)> {
    if total == 0 || workers == 0 {
        return Vec::new();
    }
    let n_batches = (workers as u64).min(total);
    let base = total / n_batches;
    let remainder = total % n_batches;

    let mut start = 0;
    (0..n_batches)
        .map(|i| {
            let count = base + u64::from(i < remainder);
            let range = (start, count);
            start += count;
            range
        })
        .collect()
}
