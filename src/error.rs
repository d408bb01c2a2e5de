use polars::prelude::PolarsError;
use thiserror::Error;

/// Evaluation error types
#[derive(Debug, Error)]
pub enum EvalError {
    /// Metric identifier is not in the registry
    #[error("Unsupported metric: {0}")]
    UnsupportedMetric(String),

    /// Truth and prediction sequences differ in length
    #[error("Input length mismatch: expected {expected}, got {actual}")]
    InputLengthMismatch { expected: usize, actual: usize },

    /// Non-finite metric value under the strict numeric policy
    #[error("Metric {metric} is not finite ({value})")]
    NonFinite { metric: String, value: f64 },

    /// Group or metadata column that the table does not carry
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Invalid frequency: {0}")]
    InvalidFrequency(String),

    #[error("Invalid timestamp {value:?} in column {column}")]
    InvalidTimestamp { column: String, value: String },

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Data frame error: {0}")]
    Polars(#[from] PolarsError),
}

/// Object storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage location: {0}")]
    InvalidLocation(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Access denied ({status}) for {location}")]
    AccessDenied { status: u16, location: String },

    #[error("Unexpected status {status} for {location}")]
    UnexpectedStatus { status: u16, location: String },

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0} is not UTF-8 encoded")]
    NotUtf8(String),
}

pub type Result<T, E = EvalError> = std::result::Result<T, E>;

/// Validation functions
pub fn validate_same_length(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(EvalError::InputLengthMismatch {
            expected: y_true.len(),
            actual: y_pred.len(),
        });
    }
    Ok(())
}

/// Every requested group column must be known to the table
pub fn validate_group_columns<S: AsRef<str>>(requested: &[S], available: &[String]) -> Result<()> {
    for column in requested {
        let column = column.as_ref();
        if !available.iter().any(|c| c == column) {
            return Err(EvalError::UnknownColumn(column.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_same_length_valid() {
        assert!(validate_same_length(&[1.0, 2.0], &[2.0, 3.0]).is_ok());
        assert!(validate_same_length(&[], &[]).is_ok());
    }

    #[test]
    fn test_validate_same_length_invalid() {
        let err = validate_same_length(&[1.0, 2.0, 3.0], &[1.0]).unwrap_err();
        match err {
            EvalError::InputLengthMismatch { expected, actual } => {
                assert_eq!(expected, 3);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_group_columns() {
        let available = vec!["model_set".to_string(), "id".to_string()];
        assert!(validate_group_columns(&["model_set"], &available).is_ok());
        assert!(matches!(
            validate_group_columns(&["venue"], &available),
            Err(EvalError::UnknownColumn(c)) if c == "venue"
        ));
    }

    #[test]
    fn test_error_display() {
        let err = EvalError::UnsupportedMetric("accuracy".to_string());
        assert!(err.to_string().contains("Unsupported metric"));

        let err = EvalError::from(StorageError::NotFound("gs://b/x.csv".to_string()));
        assert_eq!(err.to_string(), "Object not found: gs://b/x.csv");
    }
}
