// src/normalize/error.rs

use arrow::error::ArrowError;
use thiserror::Error;

pub type NormalizeResult<T> = Result<T, NormalizeError>;

/// Every way a run can fail while normalizing. None of them is recoverable:
/// the run aborts before any aggregate is computed.
#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("column `{column}` row {row}: not a JSON object: {message}")]
    Parse {
        column: String,
        row: usize,
        message: String,
    },
    #[error("column `{column}` row {row}: `{value}` is not numeric")]
    Conversion {
        column: String,
        row: usize,
        value: String,
    },
    #[error("column `{column}` row {row}: `{value}` is not a YYYYMMDD date")]
    DateFormat {
        column: String,
        row: usize,
        value: String,
    },
    #[error("missing column `{0}`")]
    MissingColumn(String),
    #[error("column `{0}` would appear twice after flattening")]
    DuplicateColumn(String),
    #[error("building session batch: {0}")]
    Batch(#[from] ArrowError),
}

impl NormalizeError {
    pub fn missing_column(name: impl Into<String>) -> Self {
        Self::MissingColumn(name.into())
    }
}
