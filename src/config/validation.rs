//! Configuration validation

use super::*;
use crate::error::{ChatError, Result};

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_api_config(&config.api)?;
    validate_model_config(&config.model)?;
    validate_dispatch_config(&config.dispatch)?;
    validate_logging_config(&config.logging)?;
    Ok(())
}

/// Validate API connection settings
fn validate_api_config(config: &ApiConfig) -> Result<()> {
    if config.base_url.is_empty() {
        return Err(ChatError::Config(
            "API base URL cannot be empty".to_string()
        ));
    }

    if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
        return Err(ChatError::Config(
            "API base URL must start with http:// or https://".to_string()
        ));
    }

    if config.tls_enabled && !config.base_url.starts_with("https://") {
        return Err(ChatError::Config(
            "TLS is enabled but base URL does not use https://".to_string()
        ));
    }

    if config.api_key.expose_secret().is_empty() {
        return Err(ChatError::Config(
            "API key is required".to_string()
        ));
    }

    if config.timeout_secs == 0 {
        return Err(ChatError::Config(
            "API timeout must be greater than 0".to_string()
        ));
    }

    if config.timeout_secs > 600 {
        return Err(ChatError::Config(
            "API timeout too large (max: 600 seconds)".to_string()
        ));
    }

    if config.connect_timeout_secs == 0 {
        return Err(ChatError::Config(
            "Connect timeout must be greater than 0".to_string()
        ));
    }

    // Fatal error if TLS verify disabled in release mode
    #[cfg(not(debug_assertions))]
    {
        if config.tls_enabled && !config.tls_verify {
            return Err(ChatError::Config(
                "TLS certificate verification cannot be disabled in production (release mode)".to_string()
            ));
        }
    }

    Ok(())
}

/// Validate default call parameters
fn validate_model_config(config: &ModelConfig) -> Result<()> {
    if config.model.trim().is_empty() {
        return Err(ChatError::Config(
            "Model name cannot be empty".to_string()
        ));
    }

    if !(0.0..=2.0).contains(&config.temperature) {
        return Err(ChatError::Config(
            format!("Temperature must be between 0.0 and 2.0, got {}", config.temperature)
        ));
    }

    if !(0.0..=1.0).contains(&config.top_p) {
        return Err(ChatError::Config(
            format!("top_p must be between 0.0 and 1.0, got {}", config.top_p)
        ));
    }

    if config.n == 0 {
        return Err(ChatError::Config(
            "Sample count n must be greater than 0".to_string()
        ));
    }

    if config.max_tokens == Some(0) {
        return Err(ChatError::Config(
            "max_tokens must be greater than 0 when set".to_string()
        ));
    }

    Ok(())
}

/// Validate dispatch settings
fn validate_dispatch_config(config: &DispatchConfig) -> Result<()> {
    if config.concurrency_limit == 0 {
        return Err(ChatError::Config(
            "Concurrency limit must be greater than 0".to_string()
        ));
    }

    if config.concurrency_limit > 1000 {
        return Err(ChatError::Config(
            "Concurrency limit too large (max: 1000)".to_string()
        ));
    }

    if config.num_retries > 100 {
        return Err(ChatError::Config(
            "Retry count too large (max: 100)".to_string()
        ));
    }

    if config.batch_timeout_secs == Some(0) {
        return Err(ChatError::Config(
            "Batch timeout must be greater than 0 when set".to_string()
        ));
    }

    Ok(())
}

/// Validate logging settings
fn validate_logging_config(config: &LoggingConfig) -> Result<()> {
    match config.format.as_str() {
        "pretty" | "json" => Ok(()),
        other => Err(ChatError::Config(
            format!("Unknown log format '{}' (expected 'pretty' or 'json')", other)
        )),
    }
}
