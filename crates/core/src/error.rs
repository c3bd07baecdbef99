use thiserror::Error;

/// Errors raised while validating record field updates
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("Unknown record field: {0}")]
    UnknownField(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Field '{field}' must be {expected}")]
    InvalidValue {
        field: String,
        expected: &'static str,
    },
}
