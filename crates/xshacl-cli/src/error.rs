//! Error types for the xshacl-explain CLI

use thiserror::Error;
use xshacl_core::{ExplainError, GraphParseError};
use xshacl_storage::StoreError;

/// Main error type for CLI operations
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid input data or arguments
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// File access or I/O error
    #[error("File error: {0}")]
    FileError(String),

    /// Input file parsing error
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Cache store could not be opened or read
    #[error("Store error: {0}")]
    StoreError(String),

    /// Generator could not be configured
    #[error("Generator error: {0}")]
    GeneratorError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl CliError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        CliError::InvalidInput(msg.into())
    }

    pub fn file_error(msg: impl Into<String>) -> Self {
        CliError::FileError(msg.into())
    }

    pub fn parse_error(msg: impl Into<String>) -> Self {
        CliError::ParseError(msg.into())
    }

    /// Check if this is a user-facing error (vs environmental)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CliError::InvalidInput(_)
                | CliError::ParseError(_)
                | CliError::GeneratorError(_)
        )
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<GraphParseError> for CliError {
    fn from(err: GraphParseError) -> Self {
        CliError::ParseError(err.to_string())
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        CliError::StoreError(err.to_string())
    }
}

impl From<ExplainError> for CliError {
    fn from(err: ExplainError) -> Self {
        match err {
            ExplainError::InvalidViolationRecord(msg) => CliError::InvalidInput(msg),
            err @ ExplainError::InvalidLanguageCode(_) => CliError::InvalidInput(err.to_string()),
            ExplainError::StoreUnavailable(msg) => CliError::StoreError(msg),
            other => CliError::InternalError(other.to_string()),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CliError::invalid_input("missing --store");
        assert_eq!(err.to_string(), "Invalid input: missing --store");
    }

    #[test]
    fn test_explain_error_mapping() {
        let err: CliError = ExplainError::invalid_record("shapeId is missing").into();
        assert!(matches!(err, CliError::InvalidInput(_)));
        assert!(err.is_user_error());

        let err: CliError = ExplainError::invalid_language("en us").into();
        assert!(matches!(err, CliError::InvalidInput(_)));

        let err: CliError = ExplainError::store_unavailable("locked").into();
        assert!(matches!(err, CliError::StoreError(_)));
        assert!(!err.is_user_error());
    }
}
