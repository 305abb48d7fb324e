//! Exact significance of core membership.
//!
//! Under the null hypothesis the interest group is a random draw (without
//! replacement) from the participating samples, so the number of interest
//! samples carrying an OTU is hypergeometric. The p-value of an OTU is the
//! probability of a random draw containing at least as many carriers as the
//! observed interest group.

use crate::config::{CoreMode, RunConfig};
use crate::correct::Corrected;
use crate::data::{AbundanceTable, OtuSummary, Partition, SignificanceResult};
use crate::error::Result;
use crate::extract::{core_set, summarize};
use crate::stats::hypergeometric_tail;
use tracing::debug;

/// Exact one-tailed p-value of an OTU's interest-group presence.
pub fn exact_pvalue(summary: &OtuSummary) -> Result<f64> {
    hypergeometric_tail(
        summary.present,
        summary.absent(),
        summary.interest,
        summary.interest_present,
    )
}

/// Run the exact test on every OTU of the table.
///
/// OTUs with interest presence fraction `>= min_presence_fraction` are
/// tested and corrected together. The result keeps those with corrected
/// p-value `<= max_p` and out-group presence fraction
/// `<= max_out_presence_fraction`, in table order.
pub fn test_exact(
    table: &AbundanceTable,
    partition: &Partition,
    config: &RunConfig,
) -> Result<Vec<SignificanceResult>> {
    let summaries = summarize(table, partition, config.min_abundance);
    let survivors = core_set(&summaries, config.min_presence_fraction, CoreMode::CoreOnly);
    debug!(
        tested = survivors.len(),
        total = summaries.len(),
        "exact test candidates"
    );

    let otu_ids: Vec<String> = survivors
        .iter()
        .map(|&row| table.otu_ids()[row].clone())
        .collect();
    let p_values = survivors
        .iter()
        .map(|&row| exact_pvalue(&summaries[row]))
        .collect::<Result<Vec<f64>>>()?;
    let corrected = Corrected::new(&otu_ids, &p_values, config.p_value_correction);

    let results = survivors
        .iter()
        .enumerate()
        .filter_map(|(i, &row)| {
            let summary = &summaries[row];
            let result = SignificanceResult {
                otu_id: otu_ids[i].clone(),
                p_value: corrected.p_values[i],
                corrected_p_value: corrected.corrected[i],
                interest_fraction: summary.interest_fraction(),
                out_fraction: summary.out_fraction(),
                threshold: config.min_presence_fraction,
                random_occurrences: None,
            };
            (result.is_significant_at(config.max_p)
                && result.out_fraction <= config.max_out_presence_fraction)
                .then_some(result)
        })
        .collect();
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correct::CorrectionMethod;
    use crate::data::Side;
    use approx::assert_relative_eq;
    use sprs::TriMat;

    fn create_test_data(rows: &[&[usize]]) -> (AbundanceTable, Partition) {
        let mut tri_mat = TriMat::new((rows.len(), 8));
        for (row, cols) in rows.iter().enumerate() {
            for &col in cols.iter() {
                tri_mat.add_triplet(row, col, 10.0);
            }
        }
        let table = AbundanceTable::new(
            tri_mat.to_csr(),
            (0..rows.len()).map(|i| format!("otu_{}", i)).collect(),
            (0..8).map(|i| format!("s{}", i)).collect(),
        )
        .unwrap();
        let mut sides = vec![Side::Interest; 4];
        sides.extend(vec![Side::Out; 4]);
        (table, Partition::from_sides(sides))
    }

    #[test]
    fn test_exact_pvalue_matches_hypergeometric() {
        let summary = OtuSummary {
            otu_index: 0,
            total: 8,
            present: 3,
            interest: 4,
            interest_present: 3,
            out: 4,
            out_present: 0,
        };
        assert_relative_eq!(exact_pvalue(&summary).unwrap(), 5.0 / 70.0, epsilon = 1e-12);
    }

    #[test]
    fn test_only_survivors_are_corrected() {
        // otu_0: 4/4 interest, 0/4 out -> p = 1/70
        // otu_1: 4/4 interest, 1/4 out -> p = 5/70
        // otu_2: 1/4 interest, not tested
        let (table, partition) = create_test_data(&[&[0, 1, 2, 3], &[0, 1, 2, 3, 4], &[0]]);
        let config = RunConfig {
            min_presence_fraction: 1.0,
            max_p: 1.0,
            p_value_correction: CorrectionMethod::Bonferroni,
            ..RunConfig::new("F", &["a"])
        };
        let results = test_exact(&table, &partition, &config).unwrap();
        assert_eq!(results.len(), 2);
        assert_relative_eq!(results[0].p_value, 1.0 / 70.0, epsilon = 1e-12);
        assert_relative_eq!(results[0].corrected_p_value, 2.0 / 70.0, epsilon = 1e-12);
        assert_relative_eq!(results[1].p_value, 5.0 / 70.0, epsilon = 1e-12);
        assert_relative_eq!(results[1].out_fraction, 0.25);
    }

    #[test]
    fn test_filters_on_corrected_p_and_out_fraction() {
        let (table, partition) = create_test_data(&[&[0, 1, 2, 3], &[0, 1, 2, 3, 4, 5, 6, 7]]);
        let config = RunConfig {
            min_presence_fraction: 1.0,
            max_out_presence_fraction: 0.25,
            p_value_correction: CorrectionMethod::None,
            ..RunConfig::new("F", &["a"])
        };
        let results = test_exact(&table, &partition, &config).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].otu_id, "otu_0");
        assert_eq!(results[0].threshold, 1.0);
        assert_eq!(results[0].random_occurrences, None);
    }

    #[test]
    fn test_no_survivors() {
        let (table, partition) = create_test_data(&[&[0], &[4]]);
        let config = RunConfig::new("F", &["a"]);
        assert!(test_exact(&table, &partition, &config).unwrap().is_empty());
    }
}
