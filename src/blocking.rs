//! Synchronous wrapper around [`ChatModel`] for callers without a runtime

use tokio::runtime::{Builder, Runtime};

use crate::chat::{BatchOptions, CallOptions, ChatModel};
use crate::completion::Prompt;
use crate::config::Config;
use crate::dispatch::CompletionResult;
use crate::error::Result;

/// Owns a current-thread runtime and blocks on each call. Must not be used
/// from inside another tokio runtime.
pub struct BlockingChatModel {
    inner: ChatModel,
    runtime: Runtime,
}

impl BlockingChatModel {
    pub fn new(inner: ChatModel) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { inner, runtime })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(ChatModel::from_config(config)?)
    }

    pub fn model(&self) -> &ChatModel {
        &self.inner
    }

    pub fn chat_completion(&self, prompt: &Prompt, options: &CallOptions) -> CompletionResult {
        self.runtime.block_on(self.inner.chat_completion(prompt, options))
    }

    pub fn create_chat_completion(
        &self,
        system_message: &str,
        user_message: &str,
        options: &CallOptions,
    ) -> CompletionResult {
        self.runtime
            .block_on(self.inner.create_chat_completion(system_message, user_message, options))
    }

    pub fn chat_completions(&self, prompts: &[Prompt], options: &CallOptions) -> Vec<CompletionResult> {
        self.runtime.block_on(self.inner.chat_completions(prompts, options))
    }

    /// Concurrent batch, blocking until every request settles or the batch
    /// times out
    pub fn async_chat_completions(
        &self,
        prompts: Vec<Prompt>,
        options: &BatchOptions,
    ) -> Result<Vec<CompletionResult>> {
        self.runtime
            .block_on(self.inner.async_chat_completions(prompts, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DispatchConfig, ModelConfig};
    use crate::dispatch::testing::StubProvider;
    use crate::format::OutputFormat;
    use std::sync::Arc;

    fn blocking(stub: Arc<StubProvider>) -> BlockingChatModel {
        let model = ChatModel::new(stub, &ModelConfig::default(), DispatchConfig::default());
        BlockingChatModel::new(model).unwrap()
    }

    #[test]
    fn test_blocking_single_call() {
        let model = blocking(Arc::new(StubProvider::new()));

        let result = model.create_chat_completion(
            "system",
            "hello",
            &CallOptions::new().output_format(OutputFormat::Text),
        );

        assert_eq!(result.response().and_then(|r| r.text()), Some("answer:hello"));
    }

    #[test]
    fn test_blocking_batch_keeps_order() {
        let stub = Arc::new(StubProvider::new().always_fail("b").fail_first("c", 1));
        let model = blocking(stub.clone());
        let prompts: Vec<Prompt> = ["a", "b", "c"].iter().map(|k| Prompt::from_pair("s", *k)).collect();
        let options = BatchOptions::new(CallOptions::new().output_format(OutputFormat::Text).num_retries(1));

        let results = model.async_chat_completions(prompts, &options).unwrap();

        assert_eq!(results[0].response().and_then(|r| r.text()), Some("answer:a"));
        assert!(results[1].is_absent());
        assert_eq!(results[2].response().and_then(|r| r.text()), Some("answer:c"));
        assert_eq!(stub.calls_for("b"), 2);
    }

    #[test]
    fn test_blocking_sequential() {
        let model = blocking(Arc::new(StubProvider::new()));
        let prompts = vec![Prompt::from_pair("s", "x"), Prompt::from_pair("s", "y")];

        let results = model.chat_completions(&prompts, &CallOptions::new());

        assert!(results.iter().all(CompletionResult::is_success));
    }
}
