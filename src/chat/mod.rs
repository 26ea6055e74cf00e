//! High-level chat model: configured defaults plus single, sequential and
//! concurrent completion calls

use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::completion::{
    CallOverrides, CallParameters, ChatCompletionClient, CompletionProvider, Prompt,
};
use crate::config::{Config, DispatchConfig, ModelConfig};
use crate::dispatch::{
    CompletionResult, ConcurrentBatchDispatcher, NoProgress, ProgressSink, RetryingInvoker,
    SequentialBatchRunner, Validator,
};
use crate::error::Result;
use crate::format::OutputFormat;
use crate::observability::DispatchMetrics;

/// Per-call settings. Unset fields fall back to the model's configuration.
#[derive(Clone, Default)]
pub struct CallOptions {
    pub overrides: CallOverrides,
    pub output_format: Option<OutputFormat>,
    pub num_retries: Option<u32>,
    pub validator: Option<Arc<dyn Validator>>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn overrides(mut self, overrides: CallOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    pub fn num_retries(mut self, retries: u32) -> Self {
        self.num_retries = Some(retries);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Settings for a concurrent batch
#[derive(Clone, Default)]
pub struct BatchOptions {
    pub call: CallOptions,
    pub concurrency_limit: Option<usize>,
    pub timeout: Option<Duration>,
}

impl BatchOptions {
    pub fn new(call: CallOptions) -> Self {
        Self {
            call,
            ..Self::default()
        }
    }

    pub fn concurrency_limit(mut self, limit: usize) -> Self {
        self.concurrency_limit = Some(limit);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Chat-completion model with default call parameters and retry/concurrency
/// settings
pub struct ChatModel {
    provider: Arc<dyn CompletionProvider>,
    defaults: CallParameters,
    dispatch: DispatchConfig,
    metrics: Arc<DispatchMetrics>,
    progress: Arc<dyn ProgressSink>,
}

impl ChatModel {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: &ModelConfig, dispatch: DispatchConfig) -> Self {
        Self {
            provider,
            defaults: model.call_defaults(),
            dispatch,
            metrics: Arc::new(DispatchMetrics::new()),
            progress: Arc::new(NoProgress),
        }
    }

    /// Build an HTTP-backed model from configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = ChatCompletionClient::new(config.api.clone())?;
        info!(model = %config.model.model, "Chat model ready");
        Ok(Self::new(Arc::new(client), &config.model, config.dispatch.clone()))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn defaults(&self) -> &CallParameters {
        &self.defaults
    }

    pub fn dispatch_config(&self) -> &DispatchConfig {
        &self.dispatch
    }

    pub fn metrics(&self) -> &Arc<DispatchMetrics> {
        &self.metrics
    }

    /// Parameters for a call: the model defaults with `overrides` applied
    pub fn resolve(&self, overrides: &CallOverrides) -> CallParameters {
        self.defaults.merge(overrides)
    }

    fn invoker(&self, options: &CallOptions) -> RetryingInvoker {
        let mut invoker = RetryingInvoker::new(self.provider.clone())
            .with_output_format(options.output_format.unwrap_or(self.dispatch.output_format))
            .with_backoff(Duration::from_millis(self.dispatch.retry_backoff_ms))
            .with_metrics(self.metrics.clone());

        if let Some(validator) = &options.validator {
            invoker = invoker.with_validator(validator.clone());
        }
        invoker
    }

    fn retries(&self, options: &CallOptions) -> u32 {
        options.num_retries.unwrap_or(self.dispatch.num_retries)
    }

    /// One request with retry and validation
    pub async fn chat_completion(&self, prompt: &Prompt, options: &CallOptions) -> CompletionResult {
        let params = self.resolve(&options.overrides);
        self.invoker(options)
            .invoke(prompt, &params, self.retries(options))
            .await
    }

    /// Convenience wrapper building a system + user prompt
    pub async fn create_chat_completion(
        &self,
        system_message: &str,
        user_message: &str,
        options: &CallOptions,
    ) -> CompletionResult {
        let prompt = Prompt::from_pair(system_message, user_message);
        self.chat_completion(&prompt, options).await
    }

    /// Run prompts one after another
    pub async fn chat_completions(&self, prompts: &[Prompt], options: &CallOptions) -> Vec<CompletionResult> {
        let params = self.resolve(&options.overrides);
        SequentialBatchRunner::new(self.invoker(options))
            .with_progress(self.progress.clone())
            .run(prompts, &params, self.retries(options))
            .await
    }

    /// Run prompts concurrently, bounded by the configured (or overridden)
    /// concurrency limit. Results are index-aligned with `prompts`.
    pub async fn async_chat_completions(
        &self,
        prompts: Vec<Prompt>,
        options: &BatchOptions,
    ) -> Result<Vec<CompletionResult>> {
        let params = self.resolve(&options.call.overrides);
        let limit = options.concurrency_limit.unwrap_or(self.dispatch.concurrency_limit);
        let timeout = options.timeout.or_else(|| self.dispatch.batch_timeout());

        let results = ConcurrentBatchDispatcher::new(self.invoker(&options.call), limit)
            .with_timeout(timeout)
            .with_progress(self.progress.clone())
            .dispatch(prompts, &params, self.retries(&options.call))
            .await?;
        Ok(results)
    }
}
