//! Family-wise error rate corrections.

use std::cmp::Ordering;

/// Bonferroni correction: every p-value multiplied by the number of tests.
pub fn bonferroni(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len() as f64;
    p_values.iter().map(|&p| p * n).collect()
}

/// Bonferroni-Holm step-down correction.
///
/// The p-value with 0-based ascending rank `r` is multiplied by `n - r`.
/// Ties are ranked by input position. Output order matches input order.
pub fn bonferroni_holm(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });

    let mut adjusted = vec![0.0; n];
    for (rank, &orig_idx) in indices.iter().enumerate() {
        adjusted[orig_idx] = (n - rank) as f64 * p_values[orig_idx];
    }
    adjusted
}
