//! Sparse OTU abundance table.

use crate::error::{CoremicError, Result};
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Header prefix that marks the column line of a BIOM-style TSV export.
const OTU_HEADER: &str = "#OTU ID";

/// Diagnostics from table ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Data rows read from the file.
    pub original_otus: usize,
    /// Rows left after summing rows that share a taxonomic label.
    pub merged_otus: usize,
}

impl std::fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} OTUs read, {} after merging duplicate taxonomy",
            self.original_otus, self.merged_otus
        )
    }
}

/// Abundances of OTUs (rows) across samples (columns), stored in CSR format.
///
/// Parsed tables store only positive values, so a row's stored entries are
/// the samples in which the OTU was observed at all.
#[derive(Debug, Clone)]
pub struct AbundanceTable {
    data: CsMat<f64>,
    otu_ids: Vec<String>,
    sample_ids: Vec<String>,
}

impl AbundanceTable {
    /// Create a table from a sparse matrix and identifiers.
    ///
    /// Every stored value must be finite and non-negative.
    pub fn new(data: CsMat<f64>, otu_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != otu_ids.len() {
            return Err(CoremicError::DimensionMismatch {
                expected: nrows,
                actual: otu_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(CoremicError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        for (row, row_vec) in data.outer_iterator().enumerate() {
            for (col, &value) in row_vec.iter() {
                if !value.is_finite() || value < 0.0 {
                    return Err(CoremicError::InvalidAbundance {
                        value: value.to_string(),
                        row,
                        col,
                    });
                }
            }
        }
        Ok(Self {
            data,
            otu_ids,
            sample_ids,
        })
    }

    /// Load a table from a TSV file.
    ///
    /// Expected format:
    /// - Lines starting with `#` are comments, except a header line starting
    ///   with `#OTU ID`. Without such a line the first non-comment line is
    ///   the header.
    /// - First column: OTU id. Following columns: one per sample.
    /// - An optional last column named `taxonomy`. When present, rows are
    ///   keyed by taxonomy and rows sharing a label are summed.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<(Self, IngestSummary)> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parse a table from any buffered reader. See [`AbundanceTable::from_tsv`].
    pub fn from_reader<R: BufRead>(reader: R) -> Result<(Self, IngestSummary)> {
        let mut header: Option<Vec<String>> = None;
        let mut has_taxonomy = false;
        let mut n_samples = 0;

        let mut row_of_key: HashMap<String, usize> = HashMap::new();
        let mut otu_ids: Vec<String> = Vec::new();
        let mut triplets: Vec<(usize, usize, f64)> = Vec::new();
        let mut original_otus = 0;

        for (line_no, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                continue;
            }

            if header.is_none() {
                if line.starts_with('#') && !line.starts_with(OTU_HEADER) {
                    continue;
                }
                let fields: Vec<String> = line.split('\t').map(|s| s.trim().to_string()).collect();
                has_taxonomy = fields
                    .last()
                    .map(|f| f.eq_ignore_ascii_case("taxonomy"))
                    .unwrap_or(false);
                n_samples = fields.len().saturating_sub(1 + usize::from(has_taxonomy));
                if n_samples == 0 {
                    return Err(CoremicError::EmptyData(
                        "OTU table must have at least one sample column".to_string(),
                    ));
                }
                header = Some(fields);
                continue;
            }
            if line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split('\t').collect();
            let expected = n_samples + 1 + usize::from(has_taxonomy);
            if fields.len() != expected {
                return Err(CoremicError::DimensionMismatch {
                    expected,
                    actual: fields.len(),
                });
            }

            let key = if has_taxonomy {
                fields[expected - 1].trim()
            } else {
                fields[0].trim()
            };
            let next_row = otu_ids.len();
            let row = *row_of_key.entry(key.to_string()).or_insert_with(|| {
                otu_ids.push(key.to_string());
                next_row
            });
            original_otus += 1;

            for (col, value_str) in fields[1..=n_samples].iter().enumerate() {
                let value: f64 =
                    value_str
                        .trim()
                        .parse()
                        .map_err(|_| CoremicError::InvalidAbundance {
                            value: value_str.to_string(),
                            row: line_no,
                            col,
                        })?;
                if !value.is_finite() || value < 0.0 {
                    return Err(CoremicError::InvalidAbundance {
                        value: value_str.to_string(),
                        row: line_no,
                        col,
                    });
                }
                if value > 0.0 {
                    triplets.push((row, col, value));
                }
            }
        }

        let header =
            header.ok_or_else(|| CoremicError::EmptyData("Empty OTU table".to_string()))?;
        if otu_ids.is_empty() {
            return Err(CoremicError::EmptyData("No OTUs in table".to_string()));
        }
        let sample_ids: Vec<String> = header[1..=n_samples].to_vec();

        // Duplicate (row, col) triplets are summed when converting to CSR
        let mut tri_mat = TriMat::new((otu_ids.len(), n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }
        let data: CsMat<f64> = tri_mat.to_csr();

        let summary = IngestSummary {
            original_otus,
            merged_otus: otu_ids.len(),
        };
        Ok((Self::new(data, otu_ids, sample_ids)?, summary))
    }

    /// Write the table as TSV with a `#OTU ID` header.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "{}", OTU_HEADER)?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row, otu_id) in self.otu_ids.iter().enumerate() {
            write!(writer, "{}", otu_id)?;
            for value in self.row_dense(row) {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }

    /// Convert every sample column to relative abundance.
    ///
    /// Columns with a zero total stay all-zero.
    pub fn to_relative(&self) -> Self {
        let totals = self.col_sums();
        let mut tri_mat = TriMat::new(self.data.shape());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &value) in row_vec.iter() {
                if totals[col] > 0.0 {
                    tri_mat.add_triplet(row, col, value / totals[col]);
                }
            }
        }
        Self {
            data: tri_mat.to_csr(),
            otu_ids: self.otu_ids.clone(),
            sample_ids: self.sample_ids.clone(),
        }
    }

    /// Value at (row, col); zero for entries that are not stored.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data.get(row, col).copied().unwrap_or(0.0)
    }

    #[inline]
    pub fn n_otus(&self) -> usize {
        self.data.rows()
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    #[inline]
    pub fn otu_ids(&self) -> &[String] {
        &self.otu_ids
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<f64> {
        &self.data
    }

    /// Iterate over OTU rows as sparse vectors.
    pub fn row_iter(&self) -> impl Iterator<Item = sprs::CsVecViewI<'_, f64, usize>> + '_ {
        self.data.outer_iterator()
    }

    /// Dense copy of one OTU row.
    pub fn row_dense(&self, row: usize) -> Vec<f64> {
        let mut dense = vec![0.0; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Total abundance per sample.
    pub fn col_sums(&self) -> Vec<f64> {
        let mut sums = vec![0.0; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }
}

impl std::fmt::Display for AbundanceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AbundanceTable: {} OTUs x {} samples ({} non-zero)",
            self.n_otus(),
            self.n_samples(),
            self.data.nnz()
        )
    }
}
