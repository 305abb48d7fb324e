//! Significance of core membership: exact and permutation.

pub mod exact;

pub use exact::{exact_pvalue, test_exact};
pub use permutation::{empirical_pvalue, permutation_results, PermutationEngine};
