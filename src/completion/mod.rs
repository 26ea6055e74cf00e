//! Chat-completion service access: request/response models, call
//! parameters, and the HTTP client for OpenAI-compatible endpoints

pub mod client;
pub mod models;
pub mod params;

pub use client::ChatCompletionClient;
pub use models::{ChatCompletion, ChatMessage, Choice, Prompt, ResponseMessage, Role, Usage};
pub use params::{CallOverrides, CallParameters, ChatCompletionRequest};

use async_trait::async_trait;
use crate::error::CompletionError;

/// Trait for chat-completion backends.
///
/// Implementations perform exactly one remote call per invocation; retrying
/// is the caller's job.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Request a completion for `messages` using fully resolved `params`
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CallParameters,
    ) -> std::result::Result<ChatCompletion, CompletionError>;
}
