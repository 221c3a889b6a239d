//! Controller configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to do when the store cannot be read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreReadPolicy {
    /// Fail the language with `StoreUnavailable`
    #[default]
    FailFast,
    /// Log a warning and continue as a cache miss
    TreatAsMiss,
}

impl std::str::FromStr for StoreReadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fail-fast" | "failfast" => Ok(StoreReadPolicy::FailFast),
            "treat-as-miss" | "miss" => Ok(StoreReadPolicy::TreatAsMiss),
            other => Err(format!("Unknown store read policy: {}", other)),
        }
    }
}

/// Explanation cache controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Upper bound on simultaneous generator calls
    pub max_concurrent_generations: usize,

    /// Timeout for one generator attempt in milliseconds
    pub generation_timeout_ms: u64,

    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Behavior on store read failures
    pub store_read_policy: StoreReadPolicy,

    /// Record similar cases and domain rules on misses
    pub record_relations: bool,

    /// Model identifier forwarded to the generator
    pub model: Option<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_generations: 4,
            generation_timeout_ms: 30_000,
            max_retries: 2,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
            store_read_policy: StoreReadPolicy::FailFast,
            record_relations: true,
            model: None,
        }
    }
}

impl ControllerConfig {
    /// Create a new config builder
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::new()
    }

    /// Create config from `XSHACL_*` environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_generations: env_or("XSHACL_MAX_CONCURRENT_GENERATIONS", defaults.max_concurrent_generations),
            generation_timeout_ms: env_or("XSHACL_GENERATION_TIMEOUT_MS", defaults.generation_timeout_ms),
            max_retries: env_or("XSHACL_MAX_RETRIES", defaults.max_retries),
            initial_backoff_ms: env_or("XSHACL_INITIAL_BACKOFF_MS", defaults.initial_backoff_ms),
            max_backoff_ms: env_or("XSHACL_MAX_BACKOFF_MS", defaults.max_backoff_ms),
            backoff_multiplier: env_or("XSHACL_BACKOFF_MULTIPLIER", defaults.backoff_multiplier),
            store_read_policy: env_or("XSHACL_STORE_READ_POLICY", defaults.store_read_policy),
            record_relations: env_or("XSHACL_RECORD_RELATIONS", defaults.record_relations),
            model: std::env::var("XSHACL_MODEL").ok().filter(|m| !m.trim().is_empty()),
        }
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    /// Backoff before retry `attempt` (1-based), capped at `max_backoff_ms`
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let mut backoff_ms = self.initial_backoff_ms;
        for _ in 1..attempt {
            backoff_ms = (backoff_ms as f64 * self.backoff_multiplier) as u64;
            backoff_ms = backoff_ms.min(self.max_backoff_ms);
        }
        Duration::from_millis(backoff_ms.min(self.max_backoff_ms))
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Builder for ControllerConfig
pub struct ControllerConfigBuilder {
    config: ControllerConfig,
}

impl ControllerConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self {
            config: ControllerConfig::default(),
        }
    }

    pub fn max_concurrent_generations(mut self, max: usize) -> Self {
        self.config.max_concurrent_generations = max.max(1);
        self
    }

    pub fn generation_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.config.generation_timeout_ms = timeout_ms;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn initial_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.config.initial_backoff_ms = backoff_ms;
        self
    }

    pub fn max_backoff_ms(mut self, backoff_ms: u64) -> Self {
        self.config.max_backoff_ms = backoff_ms;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.backoff_multiplier = multiplier;
        self
    }

    pub fn store_read_policy(mut self, policy: StoreReadPolicy) -> Self {
        self.config.store_read_policy = policy;
        self
    }

    pub fn record_relations(mut self, enabled: bool) -> Self {
        self.config.record_relations = enabled;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    /// Build the config
    pub fn build(self) -> ControllerConfig {
        self.config
    }
}

impl Default for ControllerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
