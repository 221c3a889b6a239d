//! Generator capability: turns a justification tree and context into prose

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xshacl_core::{DomainContext, JustificationNode, ViolationRecord, ViolationSignature};

/// Errors a generator may report
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeneratorError {
    #[error("Generation timed out after {0} ms")]
    Timeout(u64),

    #[error("Generator API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Generator rate limited: {0}")]
    RateLimited(String),

    #[error("Malformed generator output: {0}")]
    MalformedOutput(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// Missing credentials or other setup the generator cannot run without
    #[error("Generator not configured: {0}")]
    NotConfigured(String),
}

impl GeneratorError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GeneratorError::Timeout(_)
            | GeneratorError::RateLimited(_)
            | GeneratorError::Transport(_) => true,
            GeneratorError::Api { status, .. } => *status >= 500 || *status == 408,
            GeneratorError::MalformedOutput(_) | GeneratorError::NotConfigured(_) => false,
        }
    }
}

/// Everything a generator needs for one language
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub record: &'a ViolationRecord,
    pub signature: &'a ViolationSignature,
    pub justification: &'a JustificationNode,
    pub context: &'a DomainContext,
    pub language: &'a str,
    pub model: Option<&'a str>,
}

/// Generator output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedExplanation {
    pub text: String,
    #[serde(default)]
    pub correction_suggestions: Vec<String>,
    /// Identifier of the model that produced the text
    pub model: String,
}

impl GeneratedExplanation {
    /// Reject empty output
    pub fn validate(self) -> Result<Self, GeneratorError> {
        if self.text.trim().is_empty() {
            return Err(GeneratorError::MalformedOutput(
                "explanation text is empty".into(),
            ));
        }
        Ok(self)
    }
}

/// Natural-language generation capability
#[async_trait]
pub trait ExplanationGenerator: Send + Sync {
    /// Default model identifier, used when the request names none
    fn model(&self) -> &str;

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> Result<GeneratedExplanation, GeneratorError>;
}
