//! Multiple testing correction.
//!
//! Every method preserves input order: the i-th corrected value belongs to
//! the i-th raw p-value, so callers can zip results back onto OTU ids.

pub mod bh;
pub mod bonferroni;

use crate::error::{CoremicError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use bh::benjamini_hochberg;
pub use bonferroni::{bonferroni, bonferroni_holm};

/// Supported correction methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionMethod {
    None,
    #[serde(alias = "bf")]
    Bonferroni,
    #[serde(alias = "bf-h", alias = "holm")]
    BonferroniHolm,
    #[default]
    #[serde(alias = "b-h", alias = "bh")]
    BenjaminiHochberg,
}

impl CorrectionMethod {
    /// Canonical tag, as used in configuration and report headers.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bonferroni => "bonferroni",
            Self::BonferroniHolm => "bonferroni-holm",
            Self::BenjaminiHochberg => "benjamini-hochberg",
        }
    }

    /// Apply this correction to raw p-values.
    pub fn apply(&self, p_values: &[f64]) -> Vec<f64> {
        match self {
            Self::None => p_values.to_vec(),
            Self::Bonferroni => bonferroni(p_values),
            Self::BonferroniHolm => bonferroni_holm(p_values),
            Self::BenjaminiHochberg => benjamini_hochberg(p_values),
        }
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CorrectionMethod {
    type Err = CoremicError;

    /// Parse a method tag. The legacy short tags (`bf`, `bf-h`, `b-h`) are
    /// accepted as aliases.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(Self::None),
            "bonferroni" | "bf" => Ok(Self::Bonferroni),
            "bonferroni-holm" | "bf-h" | "holm" => Ok(Self::BonferroniHolm),
            "benjamini-hochberg" | "b-h" | "bh" => Ok(Self::BenjaminiHochberg),
            _ => Err(CoremicError::UnsupportedCorrection(s.to_string())),
        }
    }
}

/// Correct p-values using a method given by its tag.
///
/// # Errors
/// `CoremicError::UnsupportedCorrection` for an unknown tag; there is no
/// fallback method.
pub fn correct_pvalues(p_values: &[f64], method: &str) -> Result<Vec<f64>> {
    let method: CorrectionMethod = method.parse()?;
    Ok(method.apply(p_values))
}

/// Corrected p-values paired with their OTU ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corrected {
    /// OTU ids in original order.
    pub otu_ids: Vec<String>,
    /// Raw p-values.
    pub p_values: Vec<f64>,
    /// Corrected p-values, same order.
    pub corrected: Vec<f64>,
    /// Method used.
    pub method: CorrectionMethod,
}

impl Corrected {
    /// Correct `p_values` (aligned with `otu_ids`) with `method`.
    pub fn new(otu_ids: &[String], p_values: &[f64], method: CorrectionMethod) -> Self {
        Self {
            otu_ids: otu_ids.to_vec(),
            p_values: p_values.to_vec(),
            corrected: method.apply(p_values),
            method,
        }
    }

    /// Corrected value for an OTU.
    pub fn get(&self, otu_id: &str) -> Option<f64> {
        let idx = self.otu_ids.iter().position(|o| o == otu_id)?;
        self.corrected.get(idx).copied()
    }

    /// Number of OTUs at or below `max_p` after correction.
    pub fn n_significant(&self, max_p: f64) -> usize {
        self.corrected.iter().filter(|&&q| q <= max_p).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    const ALL: [CorrectionMethod; 4] = [
        CorrectionMethod::None,
        CorrectionMethod::Bonferroni,
        CorrectionMethod::BonferroniHolm,
        CorrectionMethod::BenjaminiHochberg,
    ];

    #[test]
    fn test_parse_tags_and_aliases() {
        assert_eq!("none".parse::<CorrectionMethod>().unwrap(), CorrectionMethod::None);
        assert_eq!("bf".parse::<CorrectionMethod>().unwrap(), CorrectionMethod::Bonferroni);
        assert_eq!(
            "bonferroni-holm".parse::<CorrectionMethod>().unwrap(),
            CorrectionMethod::BonferroniHolm
        );
        assert_eq!(
            "B-H".parse::<CorrectionMethod>().unwrap(),
            CorrectionMethod::BenjaminiHochberg
        );
        for method in ALL {
            assert_eq!(method.name().parse::<CorrectionMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_unknown_method_is_rejected() {
        let err = correct_pvalues(&[0.1], "sidak").unwrap_err();
        assert!(matches!(err, CoremicError::UnsupportedCorrection(ref m) if m == "sidak"));
    }

    #[test]
    fn test_none_passes_through() {
        let p = vec![0.3, 0.01, 0.2];
        assert_eq!(correct_pvalues(&p, "none").unwrap(), p);
    }

    #[test]
    fn test_corrected_lookup() {
        let ids: Vec<String> = (0..3).map(|i| format!("otu_{}", i)).collect();
        let corrected = Corrected::new(&ids, &[0.01, 0.02, 0.5], CorrectionMethod::Bonferroni);
        assert_relative_eq!(corrected.get("otu_1").unwrap(), 0.06, epsilon = 1e-12);
        assert_eq!(corrected.get("missing"), None);
        assert_eq!(corrected.n_significant(0.05), 1);
    }

    #[test]
    fn test_serde_tags() {
        let yaml = serde_yaml::to_string(&CorrectionMethod::BonferroniHolm).unwrap();
        assert_eq!(yaml.trim(), "bonferroni-holm");
        let parsed: CorrectionMethod = serde_yaml::from_str("b-h").unwrap();
        assert_eq!(parsed, CorrectionMethod::BenjaminiHochberg);
    }

    proptest! {
        #[test]
        fn prop_length_and_order_preserved(p in proptest::collection::vec(0.0f64..=1.0, 0..50)) {
            for method in ALL {
                let adjusted = method.apply(&p);
                prop_assert_eq!(adjusted.len(), p.len());
                // Each adjusted value is its own raw value scaled by a factor >= 1
                for (a, raw) in adjusted.iter().zip(p.iter()) {
                    prop_assert!(*a >= *raw);
                }
            }
        }

        #[test]
        fn prop_bonferroni_pointwise(p in proptest::collection::vec(0.0f64..=1.0, 1..50)) {
            let adjusted = bonferroni(&p);
            let n = p.len() as f64;
            for (a, raw) in adjusted.iter().zip(p.iter()) {
                prop_assert_eq!(*a, raw * n);
            }
        }

        #[test]
        fn prop_bh_monotone_in_significance_rank(p in proptest::collection::vec(0.0f64..=1.0, 1..50)) {
            let adjusted = benjamini_hochberg(&p);
            let mut order: Vec<usize> = (0..p.len()).collect();
            order.sort_by(|&a, &b| p[a].partial_cmp(&p[b]).unwrap().then(a.cmp(&b)));
            for pair in order.windows(2) {
                prop_assert!(adjusted[pair[0]] <= adjusted[pair[1]]);
            }
        }

        #[test]
        fn prop_none_is_identity(p in proptest::collection::vec(0.0f64..=1.0, 0..50)) {
            prop_assert_eq!(CorrectionMethod::None.apply(&p), p);
        }
    }
}
