//! Typed per-OTU statistics and significance results.

use serde::{Deserialize, Serialize};

/// Presence counts of one OTU under one partition.
///
/// Counts cover participating samples only (interest plus out group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtuSummary {
    /// Row of the OTU in the abundance table.
    pub otu_index: usize,
    /// Participating samples.
    pub total: usize,
    /// Samples (either side) where the OTU is present.
    pub present: usize,
    /// Interest group size.
    pub interest: usize,
    /// Interest samples where the OTU is present.
    pub interest_present: usize,
    /// Out group size.
    pub out: usize,
    /// Out samples where the OTU is present.
    pub out_present: usize,
}

impl OtuSummary {
    #[inline]
    pub fn absent(&self) -> usize {
        self.total - self.present
    }

    #[inline]
    pub fn interest_absent(&self) -> usize {
        self.interest - self.interest_present
    }

    /// Fraction of interest samples with the OTU present.
    #[inline]
    pub fn interest_fraction(&self) -> f64 {
        if self.interest == 0 {
            0.0
        } else {
            self.interest_present as f64 / self.interest as f64
        }
    }

    /// Fraction of out-group samples with the OTU present.
    #[inline]
    pub fn out_fraction(&self) -> f64 {
        if self.out == 0 {
            0.0
        } else {
            self.out_present as f64 / self.out as f64
        }
    }
}

/// Significance of one OTU at one threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignificanceResult {
    pub otu_id: String,
    /// Raw p-value (exact tail probability or empirical frequency).
    pub p_value: f64,
    /// P-value after multiple-testing correction.
    pub corrected_p_value: f64,
    pub interest_fraction: f64,
    pub out_fraction: f64,
    /// Presence-fraction threshold under which the OTU qualified.
    pub threshold: f64,
    /// Times the OTU was core in shuffled data; `None` on the exact path.
    pub random_occurrences: Option<u64>,
}

impl SignificanceResult {
    /// Check if significant at `max_p` after correction.
    pub fn is_significant_at(&self, max_p: f64) -> bool {
        self.corrected_p_value <= max_p
    }
}
