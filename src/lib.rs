//! Chat Dispatch - reliable batch access to chat-completion APIs
//!
//! A thin client for OpenAI-compatible chat-completion endpoints with the
//! reliability features batch workloads need.
//!
//! ## Features
//!
//! - **Bounded Concurrency**: a fixed cap on in-flight requests per batch
//! - **Retry with Validation**: failed calls and rejected responses share one retry budget
//! - **Ordered Results**: batch results line up with the input, failures included
//! - **Batch Timeout**: optional deadline for a whole batch
//! - **Output Shaping**: raw completions, plain text, or flat bundles with prompt and usage
//! - **Observability**: structured logging and dispatch metrics
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chat_dispatch::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::from_file("config.toml")?;
//!     let model = ChatModel::from_config(&config)?;
//!
//!     let prompts = vec![
//!         Prompt::from_pair("You are a helpful assistant.", "What is the capital of France?"),
//!         Prompt::from_pair("You are a helpful assistant.", "What is the capital of Peru?"),
//!     ];
//!     let options = BatchOptions::new(CallOptions::new().output_format(OutputFormat::Text));
//!
//!     for result in model.async_chat_completions(prompts, &options).await? {
//!         println!("{:?}", result.response().and_then(|r| r.text()));
//!     }
//!     Ok(())
//! }
//! ```

pub mod blocking;
pub mod chat;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod observability;

pub use config::Config;
pub use error::{ChatError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::blocking::BlockingChatModel;
    pub use crate::chat::{BatchOptions, CallOptions, ChatModel};
    pub use crate::completion::{
        CallOverrides, CallParameters, ChatCompletion, ChatCompletionClient, ChatMessage,
        CompletionProvider, Prompt, Role,
    };
    pub use crate::config::Config;
    pub use crate::dispatch::{
        CompletionResult, ConcurrentBatchDispatcher, ProgressSink, RetryingInvoker,
        SequentialBatchRunner, Validator,
    };
    pub use crate::error::{ChatError, CompletionError, DispatchError, Result};
    pub use crate::format::{Bundle, FormattedResponse, OutputFormat};
    pub use crate::observability::DispatchMetrics;
}
