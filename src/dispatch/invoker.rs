//! Single-request invocation with validation-driven retry

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::{AcceptAll, CompletionResult, Validator};
use crate::completion::{CallParameters, CompletionProvider, Prompt};
use crate::error::CompletionError;
use crate::format::{format_response, OutputFormat};
use crate::observability::DispatchMetrics;

/// Upper bound for a single backoff sleep
const MAX_BACKOFF_MS: u64 = 30_000;

/// Result of [`RetryingInvoker::invoke_with_outcome`]
#[derive(Debug, Clone, PartialEq)]
pub struct InvokeOutcome {
    pub result: CompletionResult,
    /// Remote calls made; always between 1 and `retry_budget + 1`
    pub attempts: u32,
}

/// Why one attempt did not produce an accepted response
#[derive(Debug, Error)]
enum AttemptFailure {
    #[error("call failed: {0}")]
    Call(#[from] CompletionError),

    #[error("response rejected by validator")]
    Rejected,
}

/// Runs one request against a [`CompletionProvider`], retrying failed calls
/// and rejected responses until one is accepted or the budget runs out.
///
/// Cloning is cheap; clones share the provider, validator and metrics.
#[derive(Clone)]
pub struct RetryingInvoker {
    provider: Arc<dyn CompletionProvider>,
    validator: Arc<dyn Validator>,
    output_format: OutputFormat,
    backoff_base: Duration,
    metrics: Option<Arc<DispatchMetrics>>,
}

impl RetryingInvoker {
    /// Invoker with the accept-all validator, raw output and no backoff
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self {
            provider,
            validator: Arc::new(AcceptAll),
            output_format: OutputFormat::Raw,
            backoff_base: Duration::ZERO,
            metrics: None,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Sleep `base * 2^(attempt-1)` (with jitter) before each retry
    pub fn with_backoff(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<DispatchMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub(crate) fn metrics(&self) -> Option<&Arc<DispatchMetrics>> {
        self.metrics.as_ref()
    }

    /// Run `prompt` with `params`, allowing `retry_budget` retries after the
    /// first attempt
    pub async fn invoke(
        &self,
        prompt: &Prompt,
        params: &CallParameters,
        retry_budget: u32,
    ) -> CompletionResult {
        self.invoke_with_outcome(prompt, params, retry_budget).await.result
    }

    /// Same as [`invoke`](Self::invoke) but also reports how many attempts
    /// were made
    pub async fn invoke_with_outcome(
        &self,
        prompt: &Prompt,
        params: &CallParameters,
        retry_budget: u32,
    ) -> InvokeOutcome {
        let mut remaining = retry_budget;
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let failure = match self.attempt(prompt, params).await {
                Ok(result) => {
                    debug!(attempts, model = %params.model, "Completion accepted");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_success();
                    }
                    return InvokeOutcome { result, attempts };
                }
                Err(failure) => failure,
            };

            warn!(
                attempt = attempts,
                retries_left = remaining,
                model = %params.model,
                "Chat completion attempt failed: {}", failure
            );

            if remaining == 0 {
                warn!(attempts, "Giving up on request after exhausting retries");
                if let Some(metrics) = &self.metrics {
                    metrics.record_abandoned();
                }
                return InvokeOutcome {
                    result: CompletionResult::Absent,
                    attempts,
                };
            }

            remaining -= 1;
            self.backoff(attempts).await;
        }
    }

    /// One remote call, formatted and validated
    async fn attempt(
        &self,
        prompt: &Prompt,
        params: &CallParameters,
    ) -> std::result::Result<CompletionResult, AttemptFailure> {
        let started = Instant::now();
        let outcome = self.provider.complete(&prompt.messages, params).await;

        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(started.elapsed());
        }

        let completion = outcome.map_err(|e| {
            if let Some(metrics) = &self.metrics {
                metrics.record_call_failure();
            }
            AttemptFailure::from(e)
        })?;

        let response = format_response(&completion, prompt, params, self.output_format);

        if !self.validator.validate(prompt, &response) {
            if let Some(metrics) = &self.metrics {
                metrics.record_rejection();
            }
            return Err(AttemptFailure::Rejected);
        }

        Ok(CompletionResult::Success(response))
    }

    async fn backoff(&self, attempts: u32) {
        if self.backoff_base.is_zero() {
            return;
        }

        let base_ms = self.backoff_base.as_millis() as u64;
        let exp = attempts.saturating_sub(1).min(16);
        let delay = base_ms.saturating_mul(1u64 << exp).min(MAX_BACKOFF_MS);

        // Jitter (±25%)
        let jitter = (delay as f64 * 0.5 * (rand::random::<f64>() - 0.5)) as i64;
        let final_delay = Duration::from_millis((delay as i64 + jitter).max(0) as u64);

        debug!("Retrying after {}ms", final_delay.as_millis());
        tokio::time::sleep(final_delay).await;
    }
}
