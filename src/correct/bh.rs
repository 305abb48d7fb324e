//! Benjamini-Hochberg false discovery rate correction.

use std::cmp::Ordering;

/// Apply Benjamini-Hochberg FDR correction.
///
/// P-values are ranked by `(p, index)` and walked from the largest down.
/// The value at position `i` from the top (rank `n - i` from the bottom) is
/// scaled by `n / rank`, and each adjusted value is clamped to be no greater
/// than the one above it:
///
/// q[rank] = min(p[rank] * n / rank, q[rank + 1])
///
/// Output order matches input order. Values are not capped at 1.
pub fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    if n == 0 {
        return vec![];
    }

    // Ascending by (p, index), then reversed so the largest comes first
    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(Ordering::Equal)
            .then(a.cmp(&b))
    });
    indices.reverse();

    let n_f64 = n as f64;
    let mut adjusted: Vec<f64> = indices
        .iter()
        .enumerate()
        .map(|(i, &orig_idx)| {
            let rank = (n - i) as f64;
            n_f64 / rank * p_values[orig_idx]
        })
        .collect();

    for i in 0..n - 1 {
        if adjusted[i] < adjusted[i + 1] {
            adjusted[i + 1] = adjusted[i];
        }
    }

    // Restore original order
    let mut q_values = vec![0.0; n];
    for (i, &orig_idx) in indices.iter().enumerate() {
        q_values[orig_idx] = adjusted[i];
    }
    q_values
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bh_ordering() {
        // P-values in non-sorted order
        let p_values = vec![0.04, 0.01, 0.03, 0.005];
        let q_values = benjamini_hochberg(&p_values);

        // Smallest p-value (0.005 at index 3): 0.005 * 4 / 1 = 0.02
        assert_relative_eq!(q_values[3], 0.02, epsilon = 1e-10);

        // Second smallest (0.01 at index 1): min(0.01 * 4 / 2, 0.02) = 0.02
        assert_relative_eq!(q_values[1], 0.02, epsilon = 1e-10);

        // Largest keeps its raw value
        assert_relative_eq!(q_values[0], 0.04, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_known_values() {
        // Rank 1: 0.005 * 5/1 = 0.025
        // Rank 2: 0.01 * 5/2 = 0.025
        // Rank 3: 0.02 * 5/3 = 0.0333
        // Rank 4: 0.04 * 5/4 = 0.05
        // Rank 5: 0.1 * 5/5 = 0.1
        let p_values = vec![0.005, 0.01, 0.02, 0.04, 0.1];
        let q_values = benjamini_hochberg(&p_values);

        assert_relative_eq!(q_values[0], 0.025, epsilon = 1e-10);
        assert_relative_eq!(q_values[1], 0.025, epsilon = 1e-10);
        assert_relative_eq!(q_values[2], 1.0 / 30.0, epsilon = 1e-10);
        assert_relative_eq!(q_values[3], 0.05, epsilon = 1e-10);
        assert_relative_eq!(q_values[4], 0.1, epsilon = 1e-10);
    }

    #[test]
    fn test_bh_matches_r_p_adjust() {
        // p.adjust(c(0.0, 0.01, 0.029, 0.03, 0.031, 0.05, 0.069, 0.07, 0.071, 0.09, 0.1), "BH")
        let p_values = vec![0.0, 0.01, 0.029, 0.03, 0.031, 0.05, 0.069, 0.07, 0.071, 0.09, 0.1];
        let r9 = 0.071 * 11.0 / 9.0;
        let expected = [0.0, 0.055, 0.0682, 0.0682, 0.0682, r9, r9, r9, r9, 0.099, 0.1];
        let q_values = benjamini_hochberg(&p_values);
        for (q, e) in q_values.iter().zip(expected.iter()) {
            assert_relative_eq!(*q, *e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_bh_monotone_by_rank() {
        let p_values = vec![0.5, 0.001, 0.1, 0.02, 0.05, 0.01];
        let q_values = benjamini_hochberg(&p_values);

        let mut order: Vec<usize> = (0..p_values.len()).collect();
        order.sort_by(|&a, &b| p_values[a].partial_cmp(&p_values[b]).unwrap());
        for pair in order.windows(2) {
            assert!(q_values[pair[0]] <= q_values[pair[1]]);
        }
    }

    #[test]
    fn test_bh_empty_and_single() {
        assert!(benjamini_hochberg(&[]).is_empty());
        let q_values = benjamini_hochberg(&[0.05]);
        assert_relative_eq!(q_values[0], 0.05, epsilon = 1e-10);
    }
}
