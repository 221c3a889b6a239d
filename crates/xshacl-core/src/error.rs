//! Error taxonomy for the explanation pipeline
//!
//! Pure computation errors (`InvalidViolationRecord`) are never retried.
//! I/O-class errors may be retried by the controller and, once retries are
//! exhausted, are reported per affected language.

use thiserror::Error;

/// Main error type for explanation operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExplainError {
    /// Malformed or incomplete violation record (caller bug)
    #[error("Invalid violation record: {0}")]
    InvalidViolationRecord(String),

    /// Requested language is not a BCP 47 style code (caller bug)
    #[error("Invalid language code: '{0}'")]
    InvalidLanguageCode(String),

    /// Shape or data lookup failed
    #[error("Context unavailable: {0}")]
    ContextUnavailable(String),

    /// Generator call failed or returned unusable output
    #[error("Generation failed for language '{language}': {reason}")]
    GenerationFailed { language: String, reason: String },

    /// Persistence layer unreachable or returned corrupt data
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ExplainError {
    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        ExplainError::InvalidViolationRecord(msg.into())
    }

    /// Create an invalid language code error
    pub fn invalid_language(code: impl Into<String>) -> Self {
        ExplainError::InvalidLanguageCode(code.into())
    }

    /// Create a context unavailable error
    pub fn context_unavailable(msg: impl Into<String>) -> Self {
        ExplainError::ContextUnavailable(msg.into())
    }

    /// Create a generation failure for one language
    pub fn generation_failed(language: impl Into<String>, reason: impl Into<String>) -> Self {
        ExplainError::GenerationFailed {
            language: language.into(),
            reason: reason.into(),
        }
    }

    /// Create a store unavailable error
    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        ExplainError::StoreUnavailable(msg.into())
    }

    /// Whether a bounded retry may succeed
    pub fn is_retryable(&self) -> bool {
        !self.is_user_error()
    }

    /// Check if this is a caller-side error (vs environmental)
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ExplainError::InvalidViolationRecord(_) | ExplainError::InvalidLanguageCode(_)
        )
    }

    /// Short machine-readable kind, used as a metrics label
    pub fn kind(&self) -> &'static str {
        match self {
            ExplainError::InvalidViolationRecord(_) => "invalid_violation_record",
            ExplainError::InvalidLanguageCode(_) => "invalid_language_code",
            ExplainError::ContextUnavailable(_) => "context_unavailable",
            ExplainError::GenerationFailed { .. } => "generation_failed",
            ExplainError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

/// Result type alias for explanation operations
pub type Result<T> = std::result::Result<T, ExplainError>;
