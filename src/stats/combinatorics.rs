//! Binomial coefficients and hypergeometric tail probabilities.
//!
//! The tail probability answers the question at the heart of core-microbiome
//! significance: if `group_size` samples were drawn at random (without
//! replacement) from all samples, how likely is it that at least
//! `min_present` of them contain the OTU?

use crate::error::{CoremicError, Result};

/// n choose r using incremental floating-point accumulation.
///
/// Each step multiplies by one numerator factor and divides by one
/// denominator factor, so intermediate values never exceed the final
/// coefficient by more than a factor of `n`.
///
/// # Errors
/// `CoremicError::Domain` if `n < 0`, `r < 0` or `r > n`.
pub fn n_choose_r(n: i64, r: i64) -> Result<f64> {
    if n < 0 || r < 0 || r > n {
        return Err(CoremicError::Domain { n, r });
    }
    let k = r.min(n - r);
    let mut value = 1.0_f64;
    for t in 1..=k {
        value *= (n - k + t) as f64;
        value /= t as f64;
    }
    Ok(value)
}

/// Natural log of n choose r, for populations where the coefficient
/// itself overflows `f64`.
pub fn ln_n_choose_r(n: i64, r: i64) -> Result<f64> {
    if n < 0 || r < 0 || r > n {
        return Err(CoremicError::Domain { n, r });
    }
    let k = r.min(n - r);
    let mut value = 0.0_f64;
    for t in 1..=k {
        value += ((n - k + t) as f64).ln() - (t as f64).ln();
    }
    Ok(value)
}

/// One-tailed hypergeometric probability `P(X >= min_present)`.
///
/// `X` is the number of "present" items in a draw of `group_size` items
/// from a population of `present + absent` items.
///
/// ```text
/// sum_{k=min_present}^{min(present, group_size)} C(present, k) * C(absent, group_size - k)
/// ----------------------------------------------------------------------------------------
///                            C(present + absent, group_size)
/// ```
///
/// Terms where `group_size - k` exceeds `absent` are zero and skipped.
/// The sum is accumulated from the largest `k` downwards, so the result is
/// non-increasing in `min_present` even under rounding.
///
/// # Errors
/// `CoremicError::Domain` if `group_size > present + absent`.
pub fn hypergeometric_tail(
    present: usize,
    absent: usize,
    group_size: usize,
    min_present: usize,
) -> Result<f64> {
    let total = present + absent;
    if group_size > total {
        return Err(CoremicError::Domain {
            n: total as i64,
            r: group_size as i64,
        });
    }

    // Every draw contains at least this many present items.
    let support_min = group_size.saturating_sub(absent);
    if min_present <= support_min {
        return Ok(1.0);
    }
    let support_max = present.min(group_size);
    if min_present > support_max {
        return Ok(0.0);
    }

    let denom = n_choose_r(total as i64, group_size as i64)?;
    let p = if denom.is_finite() {
        let mut sum = 0.0;
        for k in (min_present..=support_max).rev() {
            sum += n_choose_r(present as i64, k as i64)?
                * n_choose_r(absent as i64, (group_size - k) as i64)?;
        }
        sum / denom
    } else {
        let ln_denom = ln_n_choose_r(total as i64, group_size as i64)?;
        let mut sum = 0.0;
        for k in (min_present..=support_max).rev() {
            let ln_term = ln_n_choose_r(present as i64, k as i64)?
                + ln_n_choose_r(absent as i64, (group_size - k) as i64)?;
            sum += (ln_term - ln_denom).exp();
        }
        sum
    };

    Ok(p.min(1.0))
}
