//! Error types for the coremic library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum CoremicError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid abundance value '{value}' at row {row}, column {col}")]
    InvalidAbundance {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing column '{0}' in group mapping")]
    MissingColumn(String),

    #[error("Interest group label '{0}' is not in the group mapping")]
    UnknownGroup(String),

    #[error("Expected exactly two groups for a binary design, found {0}")]
    GroupCount(usize),

    #[error("Unsupported p-value correction '{0}'")]
    UnsupportedCorrection(String),

    #[error("Combinatorial domain error: nCr({n}, {r})")]
    Domain { n: i64, r: i64 },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Batch {batch_id} of run {run_id} could not be resumed: {reason}")]
    ResumeFailed {
        run_id: String,
        batch_id: usize,
        reason: String,
    },

    #[error("Incomplete run: {committed} of {expected} trials committed")]
    IncompleteRun { committed: usize, expected: usize },

    #[error("Run {0} was cancelled")]
    Cancelled(String),

    #[error("Batch store error: {0}")]
    Store(String),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, CoremicError>;
