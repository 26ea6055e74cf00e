//! Bounded-concurrency batch dispatch with index-aligned results

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::{CompletionResult, NoProgress, ProgressEvent, ProgressSink, RetryingInvoker};
use crate::completion::{CallParameters, Prompt};
use crate::error::DispatchError;
use crate::observability::DispatchMetrics;

/// Default label reported to progress sinks
pub const DEFAULT_LABEL: &str = "ChatCompletions";

/// Runs a batch of prompts through a [`RetryingInvoker`] with at most
/// `concurrency_limit` requests in flight.
///
/// Every prompt gets its own task up front; a semaphore decides which of them
/// may call the API. Results come back in input order no matter which
/// request finishes first, and a request that exhausts its retries shows up
/// as [`CompletionResult::Absent`] at its own index without affecting the
/// others.
pub struct ConcurrentBatchDispatcher {
    invoker: RetryingInvoker,
    concurrency_limit: usize,
    timeout: Option<Duration>,
    progress: Arc<dyn ProgressSink>,
    label: String,
}

impl ConcurrentBatchDispatcher {
    pub fn new(invoker: RetryingInvoker, concurrency_limit: usize) -> Self {
        Self {
            invoker,
            concurrency_limit,
            timeout: None,
            progress: Arc::new(NoProgress),
            label: DEFAULT_LABEL.to_string(),
        }
    }

    /// Deadline for the whole batch; `None` waits for every request
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Run every prompt with the same resolved `params`.
    ///
    /// Returns one result per prompt, `results[i]` answering `prompts[i]`.
    /// Fails with [`DispatchError::BatchTimeout`] if the deadline passes
    /// first; outstanding requests are cancelled in that case and the
    /// results that did finish are carried in the error.
    pub async fn dispatch(
        &self,
        prompts: Vec<Prompt>,
        params: &CallParameters,
        retry_budget: u32,
    ) -> std::result::Result<Vec<CompletionResult>, DispatchError> {
        if self.concurrency_limit == 0 {
            return Err(DispatchError::InvalidArgument(
                "concurrency limit must be greater than 0".to_string()
            ));
        }

        let total = prompts.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let batch_id = Uuid::new_v4();
        let started = Instant::now();
        info!(
            %batch_id,
            total,
            concurrency = self.concurrency_limit,
            retries = retry_budget,
            "Dispatching batch"
        );

        // more permits than prompts are never used
        let permits = self.concurrency_limit.min(total).min(Semaphore::MAX_PERMITS);
        let gate = Arc::new(Semaphore::new(permits));
        let params = Arc::new(params.clone());
        let mut tasks = JoinSet::new();

        for (index, prompt) in prompts.into_iter().enumerate() {
            let gate = gate.clone();
            let params = params.clone();
            let invoker = self.invoker.clone();

            tasks.spawn(async move {
                let result = run_gated(&gate, &invoker, index, &prompt, &params, retry_budget).await;
                (index, result)
            });
        }

        self.progress.on_start(&self.label, total);

        let mut slots: Vec<Option<CompletionResult>> = (0..total).map(|_| None).collect();
        let mut completed = 0usize;

        let collect = async {
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((index, result)) => slots[index] = Some(result),
                    Err(e) => error!(%batch_id, "Request task failed to join: {}", e),
                }
                completed += 1;
                self.progress.on_complete(&ProgressEvent {
                    label: &self.label,
                    completed,
                    total,
                });
            }
        };

        let timed_out = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, collect).await.is_err(),
            None => {
                collect.await;
                false
            }
        };

        self.progress.on_finish(&self.label);

        if timed_out {
            let elapsed = started.elapsed();
            warn!(%batch_id, completed, total, "Batch deadline elapsed, cancelling outstanding requests");
            tasks.shutdown().await;
            return Err(DispatchError::BatchTimeout {
                completed,
                total,
                elapsed,
                partial: slots,
            });
        }

        let results: Vec<CompletionResult> = slots
            .into_iter()
            .map(|slot| slot.unwrap_or(CompletionResult::Absent))
            .collect();

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!(
            %batch_id,
            total,
            succeeded,
            absent = total - succeeded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );

        Ok(results)
    }
}

/// Hold one admission permit for the whole retry sequence of a request.
/// The permit is dropped on every exit path; a panicking invocation is
/// reported as `Absent`.
async fn run_gated(
    gate: &Semaphore,
    invoker: &RetryingInvoker,
    index: usize,
    prompt: &Prompt,
    params: &CallParameters,
    retry_budget: u32,
) -> CompletionResult {
    let _permit = match gate.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            error!(index, "Admission gate closed before request could run");
            return CompletionResult::Absent;
        }
    };

    let _in_flight = invoker.metrics().cloned().map(InFlight::enter);
    debug!(index, "Request admitted");

    let outcome = AssertUnwindSafe(invoker.invoke(prompt, params, retry_budget))
        .catch_unwind()
        .await;

    match outcome {
        Ok(result) => result,
        Err(_) => {
            error!(index, "Request task panicked");
            CompletionResult::Absent
        }
    }
}

/// Keeps the in-flight gauge in step with the permit, including when the
/// task is aborted at the batch deadline
struct InFlight(Arc<DispatchMetrics>);

impl InFlight {
    fn enter(metrics: Arc<DispatchMetrics>) -> Self {
        metrics.enter_gate();
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.leave_gate();
    }
}
