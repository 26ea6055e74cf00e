//! Configuration management for chat dispatch

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use secrecy::{Secret, ExposeSecret};

use crate::completion::CallParameters;
use crate::format::OutputFormat;

pub mod loader;
pub mod validation;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the chat-completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of an OpenAI-compatible API, without the `/chat/completions` suffix
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (secured)
    #[serde(serialize_with = "serialize_secret", deserialize_with = "deserialize_secret")]
    pub api_key: Secret<String>,

    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Require https for every request
    #[serde(default)]
    pub tls_enabled: bool,

    /// Verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,
}

/// Default call parameters applied to every request unless overridden
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    #[serde(default = "default_top_p")]
    pub top_p: f64,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// Number of candidate completions to request
    #[serde(default = "default_n")]
    pub n: u32,

    #[serde(default)]
    pub seed: Option<i64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_tokens: None,
            n: default_n(),
            seed: None,
        }
    }
}

impl ModelConfig {
    /// Call parameters used as the base for per-call overrides
    pub fn call_defaults(&self) -> CallParameters {
        CallParameters {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            max_tokens: self.max_tokens,
            n: self.n,
            seed: self.seed,
            extra: serde_json::Map::new(),
        }
    }
}

/// Batch dispatch and retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum number of requests in flight at once
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Retries allowed per request after the first attempt
    #[serde(default = "default_num_retries")]
    pub num_retries: u32,

    /// Deadline for a whole concurrent batch (unset = no deadline)
    #[serde(default)]
    pub batch_timeout_secs: Option<u64>,

    /// Base delay between retries in milliseconds (0 = retry immediately)
    #[serde(default)]
    pub retry_backoff_ms: u64,

    /// Shape of the values returned for successful requests
    #[serde(default)]
    pub output_format: OutputFormat,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            num_retries: default_num_retries(),
            batch_timeout_secs: None,
            retry_backoff_ms: 0,
            output_format: OutputFormat::default(),
        }
    }
}

impl DispatchConfig {
    pub fn batch_timeout(&self) -> Option<Duration> {
        self.batch_timeout_secs.map(Duration::from_secs)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (`pretty` or `json`)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_timeout() -> u64 { 60 }
fn default_connect_timeout() -> u64 { 10 }
fn default_tls_verify() -> bool { true }
fn default_model() -> String { "gpt-3.5-turbo".to_string() }
fn default_temperature() -> f64 { 0.9 }
fn default_top_p() -> f64 { 0.9 }
fn default_n() -> u32 { 1 }
fn default_concurrency_limit() -> usize { 5 }
fn default_num_retries() -> u32 { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides
    pub fn from_file_with_env<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let config = loader::load_config_with_env(path)?;
        validation::validate_config(&config)?;
        Ok(config)
    }

    /// Validate this configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validation::validate_config(self)
    }

    /// Create default configuration, taking the API key from `OPENAI_API_KEY`
    pub fn default_config() -> Self {
        Self {
            api: ApiConfig {
                base_url: default_base_url(),
                api_key: Secret::new(std::env::var("OPENAI_API_KEY").unwrap_or_default()),
                timeout_secs: default_timeout(),
                connect_timeout_secs: default_connect_timeout(),
                tls_enabled: false,
                tls_verify: true,
            },
            model: ModelConfig::default(),
            dispatch: DispatchConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Custom serializer for Secret<String>
fn serialize_secret<S>(secret: &Secret<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(secret.expose_secret())
}

/// Custom deserializer for Secret<String>
fn deserialize_secret<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(Secret::new(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_defaults_become_call_parameters() {
        let params = ModelConfig::default().call_defaults();

        assert_eq!(params.model, "gpt-3.5-turbo");
        assert_eq!(params.temperature, 0.9);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.n, 1);
        assert!(params.max_tokens.is_none());
        assert!(params.extra.is_empty());
    }

    #[test]
    fn test_batch_timeout_conversion() {
        let mut dispatch = DispatchConfig::default();
        assert!(dispatch.batch_timeout().is_none());

        dispatch.batch_timeout_secs = Some(30);
        assert_eq!(dispatch.batch_timeout(), Some(Duration::from_secs(30)));
    }
}
