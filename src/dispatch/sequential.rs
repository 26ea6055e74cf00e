//! One-at-a-time batch execution

use std::sync::Arc;
use tracing::info;

use super::batch::DEFAULT_LABEL;
use super::{CompletionResult, NoProgress, ProgressEvent, ProgressSink, RetryingInvoker};
use crate::completion::{CallParameters, Prompt};

/// Runs prompts in order, waiting for each to finish before starting the
/// next. Per-request behavior is identical to the concurrent dispatcher.
pub struct SequentialBatchRunner {
    invoker: RetryingInvoker,
    progress: Arc<dyn ProgressSink>,
    label: String,
}

impl SequentialBatchRunner {
    pub fn new(invoker: RetryingInvoker) -> Self {
        Self {
            invoker,
            progress: Arc::new(NoProgress),
            label: DEFAULT_LABEL.to_string(),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub async fn run(
        &self,
        prompts: &[Prompt],
        params: &CallParameters,
        retry_budget: u32,
    ) -> Vec<CompletionResult> {
        let total = prompts.len();
        info!(total, "Running batch sequentially");
        self.progress.on_start(&self.label, total);

        let mut results = Vec::with_capacity(total);
        for (i, prompt) in prompts.iter().enumerate() {
            results.push(self.invoker.invoke(prompt, params, retry_budget).await);
            self.progress.on_complete(&ProgressEvent {
                label: &self.label,
                completed: i + 1,
                total,
            });
        }

        self.progress.on_finish(&self.label);
        results
    }
}
