//! Error types for chat-completion dispatch

use std::time::Duration;
use thiserror::Error;

use crate::dispatch::CompletionResult;

/// Result type alias for chat dispatch operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("Completion error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised by a single remote completion call.
///
/// The retry loop treats every variant the same way: as a transient failure
/// that consumes one unit of the retry budget.
#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Errors that fail a whole batch rather than one request
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Batch timed out after {elapsed:?}: {completed} of {total} requests finished")]
    BatchTimeout {
        completed: usize,
        total: usize,
        elapsed: Duration,
        /// Index-aligned with the input; `None` where the request was cancelled
        partial: Vec<Option<CompletionResult>>,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<config::ConfigError> for ChatError {
    fn from(err: config::ConfigError) -> Self {
        ChatError::Config(err.to_string())
    }
}

impl ChatError {
    /// True when the batch deadline elapsed before every request finished
    pub fn is_batch_timeout(&self) -> bool {
        matches!(self, ChatError::Dispatch(DispatchError::BatchTimeout { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_timeout_display() {
        let err: ChatError = DispatchError::BatchTimeout {
            completed: 2,
            total: 5,
            elapsed: Duration::from_secs(3),
            partial: vec![None; 5],
        }
        .into();

        assert!(err.is_batch_timeout());
        assert!(err.to_string().contains("2 of 5"));
    }

    #[test]
    fn test_every_kind_is_constructed_by_a_conversion() {
        let errors: Vec<ChatError> = vec![
            CompletionError::AuthenticationFailed.into(),
            DispatchError::InvalidArgument("limit".into()).into(),
            config::ConfigError::NotFound("api.api_key".into()).into(),
            std::io::Error::new(std::io::ErrorKind::Other, "runtime").into(),
        ];

        for err in &errors {
            // exhaustive: a new variant must come with a way to produce it
            match err {
                ChatError::Completion(_)
                | ChatError::Dispatch(_)
                | ChatError::Config(_)
                | ChatError::Io(_) => assert!(!err.to_string().is_empty()),
            }
        }
    }

    #[test]
    fn test_completion_error_is_not_timeout() {
        let err: ChatError = CompletionError::RateLimitExceeded.into();
        assert!(!err.is_batch_timeout());
        assert_eq!(err.to_string(), "Completion error: Rate limit exceeded");
    }
}
