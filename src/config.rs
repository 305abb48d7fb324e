//! Run configuration.
//!
//! A [`RunConfig`] is built once per analysis request, validated, and then
//! passed by reference through every stage. Nothing downstream mutates it.

use crate::correct::CorrectionMethod;
use crate::error::{CoremicError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Presence-fraction thresholds used by the permutation path when none are
/// configured.
pub const DEFAULT_THRESHOLDS: [f64; 6] = [1.0, 0.95, 0.9, 0.85, 0.8, 0.75];

/// What makes an OTU "core" at a threshold `t`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoreMode {
    /// Interest presence fraction `>= t`.
    #[default]
    CoreOnly,
    /// Interest presence fraction `>= t` and out-group presence fraction `< t`.
    RelativeToOutGroup,
}

/// How an OTU never seen in shuffled data gets a non-zero p-value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ZeroOccurrence {
    /// Zero occurrences count as 0.1, every other OTU uses `occurrences / N`.
    /// Matches historical reports.
    #[default]
    Legacy,
    /// `(occurrences + 1) / (N + 1)` for every OTU.
    Laplace,
}

impl ZeroOccurrence {
    /// Empirical p-value of an OTU seen `occurrences` times in `trials` trials.
    pub fn p_value(&self, occurrences: u64, trials: usize) -> f64 {
        let n = trials as f64;
        match self {
            Self::Legacy if occurrences == 0 => 0.1 / n,
            Self::Legacy => occurrences as f64 / n,
            Self::Laplace => (occurrences as f64 + 1.0) / (n + 1.0),
        }
    }
}

/// How permutation trials are spread over workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Batches the trials are split into.
    pub workers: usize,
    /// Wall-clock budget of one worker invocation, in milliseconds.
    /// `None` runs each batch to completion.
    pub worker_budget_ms: Option<u64>,
    /// Queue-draining rounds before the run is declared incomplete.
    pub max_rounds: usize,
    /// Directory for batch checkpoints. Kept in memory when unset.
    pub checkpoint_dir: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            worker_budget_ms: None,
            max_rounds: 1000,
            checkpoint_dir: None,
        }
    }
}

/// Parameters of one core-microbiome analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Used to name reports.
    pub name: String,
    /// Mapping column holding the group labels.
    pub factor: String,
    /// Interest group label(s). Several labels are joined into one group.
    pub group: Vec<String>,
    /// Out-group label(s). Empty selects every other group.
    pub out_group: Vec<String>,
    /// Abundances strictly above this count as present.
    pub min_abundance: f64,
    pub min_presence_fraction: f64,
    pub max_out_presence_fraction: f64,
    /// Largest corrected p-value kept in the report.
    pub max_p: f64,
    pub p_value_correction: CorrectionMethod,
    /// Permutation trials; 0 uses the exact hypergeometric calculation.
    pub trial_count: usize,
    /// Presence-fraction thresholds of the permutation path.
    pub thresholds: Vec<f64>,
    pub core_mode: CoreMode,
    pub zero_occurrence: ZeroOccurrence,
    /// Base seed for permutation trials. Drawn at random when unset.
    pub seed: Option<u64>,
    /// Convert abundances to per-sample fractions before analysis.
    pub relative_abundance: bool,
    /// Also report the analysis with interest and out groups swapped.
    pub include_out: bool,
    pub execution: ExecutionConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            name: "coremic".to_string(),
            factor: String::new(),
            group: Vec::new(),
            out_group: Vec::new(),
            min_abundance: 0.0,
            min_presence_fraction: 0.9,
            max_out_presence_fraction: 1.0,
            max_p: 0.05,
            p_value_correction: CorrectionMethod::default(),
            trial_count: 0,
            thresholds: DEFAULT_THRESHOLDS.to_vec(),
            core_mode: CoreMode::default(),
            zero_occurrence: ZeroOccurrence::default(),
            seed: None,
            relative_abundance: false,
            include_out: false,
            execution: ExecutionConfig::default(),
        }
    }
}

impl RunConfig {
    /// Default configuration for an interest group of `factor`.
    pub fn new(factor: &str, group: &[&str]) -> Self {
        Self {
            factor: factor.to_string(),
            group: group.iter().map(|g| g.to_string()).collect(),
            ..Self::default()
        }
    }

    /// Check every parameter. Called before any computation starts.
    pub fn validate(&self) -> Result<()> {
        if self.factor.trim().is_empty() {
            return Err(CoremicError::InvalidParameter(
                "factor must not be empty".to_string(),
            ));
        }
        if self.group.is_empty() {
            return Err(CoremicError::InvalidParameter(
                "at least one interest group is required".to_string(),
            ));
        }
        if !self.min_abundance.is_finite() || self.min_abundance < 0.0 {
            return Err(CoremicError::InvalidParameter(format!(
                "min_abundance must be a non-negative number, got {}",
                self.min_abundance
            )));
        }
        for (name, value) in [
            ("min_presence_fraction", self.min_presence_fraction),
            ("max_out_presence_fraction", self.max_out_presence_fraction),
            ("max_p", self.max_p),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CoremicError::InvalidParameter(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.trial_count > 0 {
            if self.thresholds.is_empty() {
                return Err(CoremicError::InvalidParameter(
                    "permutation runs need at least one threshold".to_string(),
                ));
            }
            if let Some(t) = self.thresholds.iter().find(|t| !(**t > 0.0 && **t <= 1.0)) {
                return Err(CoremicError::InvalidParameter(format!(
                    "thresholds must be in (0, 1], got {}",
                    t
                )));
            }
        }
        if self.execution.workers == 0 {
            return Err(CoremicError::InvalidParameter(
                "execution.workers must be at least 1".to_string(),
            ));
        }
        if self.execution.max_rounds == 0 {
            return Err(CoremicError::InvalidParameter(
                "execution.max_rounds must be at least 1".to_string(),
            ));
        }
        if self.execution.worker_budget_ms == Some(0) {
            return Err(CoremicError::InvalidParameter(
                "execution.worker_budget_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    /// Save to a YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CoremicError::from)
    }

    /// Whether the permutation path is used.
    pub fn is_permutation(&self) -> bool {
        self.trial_count > 0
    }
}
