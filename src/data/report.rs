//! Sorted core-microbiome report and its TSV rendering.

use crate::correct::CorrectionMethod;
use crate::data::{IngestSummary, SignificanceResult};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Qualifying OTUs of one analysis, in report order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreReport {
    /// Analysis name (interest group, or the swapped variant).
    pub name: String,
    pub method: CorrectionMethod,
    /// Permutation trials behind the p-values; 0 for the exact path.
    pub trial_count: usize,
    /// Ingestion diagnostics of the table the report was computed from.
    pub ingest: Option<IngestSummary>,
    pub results: Vec<SignificanceResult>,
}

impl CoreReport {
    /// Create a report, sorting results into report order.
    ///
    /// Order: interest fraction descending, corrected p-value ascending, OTU
    /// id ascending, then threshold descending.
    pub fn new(
        name: impl Into<String>,
        method: CorrectionMethod,
        trial_count: usize,
        mut results: Vec<SignificanceResult>,
    ) -> Self {
        results.sort_by(report_order);
        Self {
            name: name.into(),
            method,
            trial_count,
            ingest: None,
            results,
        }
    }

    /// Attach ingestion diagnostics.
    pub fn with_ingest(mut self, ingest: IngestSummary) -> Self {
        self.ingest = Some(ingest);
        self
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn is_permutation(&self) -> bool {
        self.trial_count > 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignificanceResult> {
        self.results.iter()
    }

    /// Column header line, without trailing newline.
    pub fn header(&self) -> String {
        let mut header = format!(
            "OTU\tp-value\t{} corrected p-value\tinterest presence fraction\tout-group presence fraction",
            self.method
        );
        if self.is_permutation() {
            header.push_str("\tfrequency-in-random-data\tthreshold");
        }
        header
    }

    /// Write the report as TSV.
    pub fn write_tsv<W: Write>(&self, mut writer: W) -> Result<()> {
        writeln!(writer, "{}", self.header())?;
        for r in &self.results {
            write!(
                writer,
                "{}\t{}\t{}\t{:.4}\t{:.4}",
                r.otu_id, r.p_value, r.corrected_p_value, r.interest_fraction, r.out_fraction
            )?;
            if self.is_permutation() {
                write!(
                    writer,
                    "\t{}\t{}",
                    r.random_occurrences.unwrap_or(0),
                    r.threshold
                )?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Write the report to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        self.write_tsv(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Render the report as a TSV string.
    pub fn to_tsv_string(&self) -> Result<String> {
        let mut buf = Vec::new();
        self.write_tsv(&mut buf)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

fn report_order(a: &SignificanceResult, b: &SignificanceResult) -> Ordering {
    b.interest_fraction
        .partial_cmp(&a.interest_fraction)
        .unwrap_or(Ordering::Equal)
        .then(
            a.corrected_p_value
                .partial_cmp(&b.corrected_p_value)
                .unwrap_or(Ordering::Equal),
        )
        .then_with(|| a.otu_id.cmp(&b.otu_id))
        .then(b.threshold.partial_cmp(&a.threshold).unwrap_or(Ordering::Equal))
}

impl std::fmt::Display for CoreReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Core report: {}", self.name)?;
        if let Some(ingest) = &self.ingest {
            writeln!(f, "  Input: {}", ingest)?;
        }
        if self.is_permutation() {
            writeln!(f, "  Method: permutation ({} trials)", self.trial_count)?;
        } else {
            writeln!(f, "  Method: exact hypergeometric")?;
        }
        writeln!(f, "  Correction: {}", self.method)?;
        writeln!(f, "  Qualifying OTUs: {}", self.len())?;
        Ok(())
    }
}
