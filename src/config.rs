//! Configuration System
//!
//! Layered configuration: built-in defaults, the global file, workspace files, then
//! `QUIZGEN__*` environment variables. An explicit `--config` file replaces both file layers.

use crate::generation::RetryPolicy;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use crate::provider::ProviderConfig;

mod facade;
mod merge;
mod sources;

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuizgenConfig {
    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Pipeline tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Global cap on in-flight external generation calls
    #[serde(default = "default_call_concurrency")]
    pub call_concurrency: usize,

    #[serde(default)]
    pub retry: RetryPolicy,

    /// Fixed output-token allowance added to stage-1 estimates
    #[serde(default = "default_stem_output_estimate")]
    pub stem_output_estimate: u64,

    /// Fixed output-token allowance added to stage-2 estimates
    #[serde(default = "default_option_output_estimate")]
    pub option_output_estimate: u64,
}

fn default_call_concurrency() -> usize {
    4
}

fn default_stem_output_estimate() -> u64 {
    crate::generation::budget::DEFAULT_STEM_OUTPUT_ESTIMATE
}

fn default_option_output_estimate() -> u64 {
    crate::generation::budget::DEFAULT_OPTION_OUTPUT_ESTIMATE
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            call_concurrency: default_call_concurrency(),
            retry: RetryPolicy::default(),
            stem_output_estimate: default_stem_output_estimate(),
            option_output_estimate: default_option_output_estimate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_tokens_per_minute")]
    pub tokens_per_minute: u64,
}

fn default_tokens_per_minute() -> u64 {
    90_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tokens_per_minute: default_tokens_per_minute(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    Postgres,
}

/// Storage backend selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// sled database directory, relative to the workspace root unless absolute
    #[serde(default = "default_sled_path")]
    pub sled_path: PathBuf,

    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_sled_path() -> PathBuf {
    PathBuf::from(".quizgen/store")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            sled_path: default_sled_path(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

/// One endpoint per generation stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_provider")]
    pub stem: ProviderConfig,

    #[serde(default = "default_provider")]
    pub options: ProviderConfig,
}

fn default_provider() -> ProviderConfig {
    ProviderConfig {
        model: "gpt-4o-mini".to_string(),
        ..ProviderConfig::default()
    }
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            stem: default_provider(),
            options: default_provider(),
        }
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Generation(String),
    RateLimit(String),
    Storage(String),
    Provider(String, String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Generation(msg) => write!(f, "Generation: {}", msg),
            ValidationError::RateLimit(msg) => write!(f, "Rate limit: {}", msg),
            ValidationError::Storage(msg) => write!(f, "Storage: {}", msg),
            ValidationError::Provider(stage, msg) => {
                write!(f, "Provider '{}': {}", stage, msg)
            }
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl QuizgenConfig {
    /// Validate the entire configuration, collecting every problem
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.generation.call_concurrency == 0 {
            errors.push(ValidationError::Generation(
                "call_concurrency must be at least 1".to_string(),
            ));
        }
        if let Err(e) = self.generation.retry.validate() {
            errors.push(ValidationError::Generation(format!("retry: {}", e)));
        }

        if self.rate_limit.tokens_per_minute == 0 {
            errors.push(ValidationError::RateLimit(
                "tokens_per_minute must be at least 1".to_string(),
            ));
        }

        match self.storage.backend {
            StorageBackend::Sled => {
                if self.storage.sled_path.as_os_str().is_empty() {
                    errors.push(ValidationError::Storage(
                        "sled_path cannot be empty".to_string(),
                    ));
                }
            }
            StorageBackend::Postgres => {
                if self
                    .storage
                    .database_url
                    .as_deref()
                    .map(str::is_empty)
                    .unwrap_or(true)
                {
                    errors.push(ValidationError::Storage(
                        "database_url is required for the postgres backend".to_string(),
                    ));
                }
                if self.storage.max_connections == 0 {
                    errors.push(ValidationError::Storage(
                        "max_connections must be at least 1".to_string(),
                    ));
                }
            }
        }

        for (stage, provider) in [
            ("stem", &self.providers.stem),
            ("options", &self.providers.options),
        ] {
            if let Err(e) = provider.validate() {
                errors.push(ValidationError::Provider(stage.to_string(), e));
            }
        }

        if !["json", "text"].contains(&self.logging.format.as_str()) {
            errors.push(ValidationError::Logging(format!(
                "format must be 'json' or 'text', got '{}'",
                self.logging.format
            )));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
