//! OpenAI-compatible chat-completions generator
//!
//! One adapter serves every provider the tool supports, since OpenAI, Google
//! and Anthropic all expose an OpenAI-compatible endpoint and Ollama does so
//! locally. The provider, and with it the default endpoint and the API key
//! variable, is chosen from the model name.
//!
//! Each explanation takes two chat calls: one for the explanation text and one
//! for correction suggestions. Retries and timeouts around the whole call are
//! the controller's job; this client only classifies failures.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use xshacl_cache::{ExplanationGenerator, GeneratedExplanation, GenerationRequest, GeneratorError};

use crate::error::{CliError, Result};

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemma:2b";

/// Hosting provider, inferred from the model name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
    Anthropic,
    Ollama,
}

impl Provider {
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        if model.contains("gpt") {
            Provider::OpenAi
        } else if model.contains("gemini") {
            Provider::Gemini
        } else if model.contains("claude") {
            Provider::Anthropic
        } else {
            Provider::Ollama
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::Anthropic => "https://api.anthropic.com/v1",
            Provider::Ollama => "http://localhost:11434/v1",
        }
    }

    /// Environment variable holding the API key, if the provider needs one
    pub fn api_key_env(&self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            Provider::Gemini => Some("GEMINI_API_KEY"),
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::Ollama => None,
        }
    }
}

/// Configuration for the chat-completions generator
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    /// HTTP request timeout in milliseconds
    pub timeout_ms: u64,
}

impl GeneratorConfig {
    /// Provider defaults for `model`, with the API key read from the environment.
    ///
    /// A missing key for a hosted provider is only reported when a request
    /// is actually made, so fully cached runs need no credentials.
    pub fn for_model(model: impl Into<String>) -> Self {
        let model = model.into();
        let provider = Provider::for_model(&model);

        let api_key = provider
            .api_key_env()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::new);

        Self {
            base_url: provider.default_base_url().to_string(),
            model,
            api_key,
            timeout_ms: 60_000,
        }
    }

    /// The key to send for `model`, or an error if its provider needs one
    fn credentials_for(&self, model: &str) -> std::result::Result<Option<&SecretString>, GeneratorError> {
        match (&self.api_key, Provider::for_model(model).api_key_env()) {
            (Some(key), _) => Ok(Some(key)),
            (None, None) => Ok(None),
            (None, Some(var)) => Err(GeneratorError::NotConfigured(format!(
                "{} environment variable not set (required for model '{}')",
                var, model
            ))),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::new(api_key.into()));
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP generator speaking the chat-completions protocol
pub struct OpenAiGenerator {
    client: Client,
    config: GeneratorConfig,
}

impl OpenAiGenerator {
    pub fn new(config: GeneratorConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| CliError::GeneratorError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    async fn chat(
        &self,
        model: &str,
        api_key: Option<&SecretString>,
        prompt: String,
    ) -> std::result::Result<String, GeneratorError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
            }],
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GeneratorError::Timeout(self.config.timeout_ms)
            } else {
                GeneratorError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&text)
                .map(|b| b.error.message)
                .unwrap_or(text);
            return Err(if status == StatusCode::TOO_MANY_REQUESTS {
                GeneratorError::RateLimited(message)
            } else {
                GeneratorError::Api {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::MalformedOutput(format!("Failed to parse response: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| GeneratorError::MalformedOutput("response contained no message".into()))
    }
}

#[async_trait]
impl ExplanationGenerator for OpenAiGenerator {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        request: GenerationRequest<'_>,
    ) -> std::result::Result<GeneratedExplanation, GeneratorError> {
        let model = request.model.unwrap_or(self.config.model.as_str());

        tracing::debug!(
            model = %model,
            language = %request.language,
            base_url = %self.config.base_url,
            "Requesting explanation"
        );

        let api_key = self.config.credentials_for(model)?;
        let text = self.chat(model, api_key, explanation_prompt(&request)?).await?;
        let suggestions = self.chat(model, api_key, suggestion_prompt(&request)?).await?;

        Ok(GeneratedExplanation {
            text,
            correction_suggestions: vec![suggestions],
            model: model.to_string(),
        })
    }
}

fn violation_message(request: &GenerationRequest<'_>) -> String {
    request
        .record
        .message
        .clone()
        .unwrap_or_else(|| "Unknown violation".to_string())
}

fn to_json<T: Serialize>(value: &T) -> std::result::Result<String, GeneratorError> {
    serde_json::to_string_pretty(value).map_err(|e| GeneratorError::MalformedOutput(e.to_string()))
}

fn explanation_prompt(request: &GenerationRequest<'_>) -> std::result::Result<String, GeneratorError> {
    Ok(format!(
        "Explain the following SHACL violation: {}. \
         Justification: {}. \
         Relevant context: {}. \
         Generate a short and concise human-readable explanation. \
         Return only the explanation, written in the language with code '{}'.",
        violation_message(request),
        to_json(request.justification)?,
        to_json(request.context)?,
        request.language
    ))
}

fn suggestion_prompt(request: &GenerationRequest<'_>) -> std::result::Result<String, GeneratorError> {
    Ok(format!(
        "Given the following SHACL violation: {}. \
         Relevant context: {}. \
         Suggest possible corrections. Be short and concise, and only suggest fixes for what was \
         reported as a violation. Answer in the language with code '{}'.",
        violation_message(request),
        to_json(request.context)?,
        request.language
    ))
}
