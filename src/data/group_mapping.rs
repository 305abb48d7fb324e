//! Sample-to-group mapping and its resolution against a table.

use crate::error::{CoremicError, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Accepted names for the sample id column of a mapping file.
const SAMPLE_COLUMNS: [&str; 2] = ["#SampleID", "SampleID"];

/// Group label -> sample ids, for one categorical factor.
///
/// Groups keep the order in which their labels first appear in the mapping
/// file, and samples keep file order within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMapping {
    factor: String,
    groups: Vec<(String, Vec<String>)>,
}

impl GroupMapping {
    /// Build a mapping from explicit groups.
    ///
    /// # Errors
    /// `InvalidParameter` if a sample is listed in more than one group.
    pub fn new(factor: impl Into<String>, groups: Vec<(String, Vec<String>)>) -> Result<Self> {
        let mut seen = HashSet::new();
        for (label, samples) in &groups {
            for sample in samples {
                if !seen.insert(sample.as_str()) {
                    return Err(CoremicError::InvalidParameter(format!(
                        "sample '{}' appears more than once (group '{}')",
                        sample, label
                    )));
                }
            }
        }
        Ok(Self {
            factor: factor.into(),
            groups,
        })
    }

    /// Load the groups of `factor` from a tab-delimited mapping file.
    pub fn from_tsv<P: AsRef<Path>>(path: P, factor: &str) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file, factor)
    }

    /// Parse a mapping from any reader.
    ///
    /// The header must contain a `SampleID` (or `#SampleID`) column and a
    /// column named `factor`. Rows whose first field starts with `#` are
    /// comments. Samples with an empty factor value are left out.
    pub fn from_reader<R: Read>(reader: R, factor: &str) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let sample_col = headers
            .iter()
            .position(|h| SAMPLE_COLUMNS.contains(&h))
            .ok_or_else(|| CoremicError::MissingColumn("SampleID".to_string()))?;
        let factor_col = headers
            .iter()
            .position(|h| h == factor)
            .ok_or_else(|| CoremicError::MissingColumn(factor.to_string()))?;

        let mut groups: Vec<(String, Vec<String>)> = Vec::new();
        for record in rdr.records() {
            let record = record?;
            let sample = match record.get(sample_col) {
                Some(s) if !s.is_empty() && !s.starts_with('#') => s,
                _ => continue,
            };
            let label = match record.get(factor_col) {
                Some(l) if !l.is_empty() => l,
                _ => continue,
            };
            match groups.iter().position(|(g, _)| g == label) {
                Some(idx) => groups[idx].1.push(sample.to_string()),
                None => groups.push((label.to_string(), vec![sample.to_string()])),
            }
        }

        if groups.is_empty() {
            return Err(CoremicError::EmptyData(format!(
                "no samples carry a value for '{}'",
                factor
            )));
        }
        Self::new(factor, groups)
    }

    pub fn factor(&self) -> &str {
        &self.factor
    }

    /// Group labels in file order.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|(label, _)| label.as_str())
    }

    /// Samples of one group.
    pub fn samples(&self, label: &str) -> Option<&[String]> {
        self.groups
            .iter()
            .find(|(g, _)| g == label)
            .map(|(_, samples)| samples.as_slice())
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn n_samples(&self) -> usize {
        self.groups.iter().map(|(_, s)| s.len()).sum()
    }

    /// Group sizes in label order.
    pub fn group_sizes(&self) -> Vec<usize> {
        self.groups.iter().map(|(_, s)| s.len()).collect()
    }

    /// Pool every sample, shuffle, and deal them back into groups of the
    /// original sizes.
    pub fn shuffled<R: Rng + ?Sized>(&self, rng: &mut R) -> Self {
        let mut pool: Vec<String> = self
            .groups
            .iter()
            .flat_map(|(_, samples)| samples.iter().cloned())
            .collect();
        pool.shuffle(rng);

        let mut rest = pool.into_iter();
        let groups = self
            .groups
            .iter()
            .map(|(label, samples)| (label.clone(), rest.by_ref().take(samples.len()).collect()))
            .collect();
        Self {
            factor: self.factor.clone(),
            groups,
        }
    }
}

fn samples_of<'a>(mapping: &'a GroupMapping, labels: &[&str]) -> HashSet<&'a str> {
    labels
        .iter()
        .filter_map(|l| mapping.samples(l))
        .flatten()
        .map(String::as_str)
        .collect()
}

/// Which side of the comparison a table column falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Interest,
    Out,
    /// Not in any selected group.
    Excluded,
}

/// A group mapping resolved against the columns of a table.
///
/// Holds one [`Side`] per table column. Shuffling reassigns sides among the
/// participating columns only, keeping the interest and out sizes fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    sides: Vec<Side>,
    participants: Vec<usize>,
    interest_count: usize,
}

impl Partition {
    /// Resolve `interest` and `out` group labels against `sample_ids`.
    ///
    /// An empty `out` list selects every group not in `interest`. Mapping
    /// samples absent from the table are ignored; table samples absent from
    /// the selected groups are `Excluded`.
    ///
    /// # Errors
    /// - `UnknownGroup` for a label the mapping does not contain.
    /// - `InvalidParameter` if a label is on both sides.
    /// - `EmptyData` if either side resolves to no table column.
    pub fn resolve(
        mapping: &GroupMapping,
        sample_ids: &[String],
        interest: &[String],
        out: &[String],
    ) -> Result<Self> {
        if interest.is_empty() {
            return Err(CoremicError::InvalidParameter(
                "at least one interest group label is required".to_string(),
            ));
        }
        for label in interest.iter().chain(out.iter()) {
            if mapping.samples(label).is_none() {
                return Err(CoremicError::UnknownGroup(label.clone()));
            }
        }
        if let Some(label) = out.iter().find(|l| interest.contains(*l)) {
            return Err(CoremicError::InvalidParameter(format!(
                "group '{}' is both interest and out group",
                label
            )));
        }

        let interest_labels: Vec<&str> = interest.iter().map(String::as_str).collect();
        let out_labels: Vec<&str> = if out.is_empty() {
            mapping
                .labels()
                .filter(|l| !interest_labels.contains(l))
                .collect()
        } else {
            out.iter().map(String::as_str).collect()
        };
        let interest_samples = samples_of(mapping, &interest_labels);
        let out_samples = samples_of(mapping, &out_labels);

        let sides: Vec<Side> = sample_ids
            .iter()
            .map(|s| {
                if interest_samples.contains(s.as_str()) {
                    Side::Interest
                } else if out_samples.contains(s.as_str()) {
                    Side::Out
                } else {
                    Side::Excluded
                }
            })
            .collect();
        let partition = Self::from_sides(sides);
        if partition.interest_count() == 0 {
            return Err(CoremicError::EmptyData(
                "no table samples belong to the interest group".to_string(),
            ));
        }
        if partition.out_count() == 0 {
            return Err(CoremicError::EmptyData(
                "no table samples belong to the out group".to_string(),
            ));
        }
        Ok(partition)
    }

    /// Build a partition directly from per-column sides.
    pub fn from_sides(sides: Vec<Side>) -> Self {
        let participants: Vec<usize> = sides
            .iter()
            .enumerate()
            .filter(|(_, side)| **side != Side::Excluded)
            .map(|(col, _)| col)
            .collect();
        let interest_count = sides.iter().filter(|s| **s == Side::Interest).count();
        Self {
            sides,
            participants,
            interest_count,
        }
    }

    /// The same partition with interest and out swapped.
    pub fn swapped(&self) -> Self {
        let sides = self
            .sides
            .iter()
            .map(|side| match side {
                Side::Interest => Side::Out,
                Side::Out => Side::Interest,
                Side::Excluded => Side::Excluded,
            })
            .collect();
        Self::from_sides(sides)
    }

    #[inline]
    pub fn sides(&self) -> &[Side] {
        &self.sides
    }

    #[inline]
    pub fn side(&self, col: usize) -> Side {
        self.sides[col]
    }

    #[inline]
    pub fn interest_count(&self) -> usize {
        self.interest_count
    }

    #[inline]
    pub fn out_count(&self) -> usize {
        self.participants.len() - self.interest_count
    }

    /// Columns on either side.
    #[inline]
    pub fn participants(&self) -> &[usize] {
        &self.participants
    }

    /// Write a uniformly shuffled copy of this partition into `buf`,
    /// reusing its allocations.
    pub fn shuffled_into<R: Rng + ?Sized>(&self, rng: &mut R, buf: &mut Partition) {
        buf.sides.clone_from(&self.sides);
        buf.participants.clone_from(&self.participants);
        buf.interest_count = self.interest_count;

        buf.participants.shuffle(rng);
        for (i, &col) in buf.participants.iter().enumerate() {
            buf.sides[col] = if i < self.interest_count {
                Side::Interest
            } else {
                Side::Out
            };
        }
    }
}
