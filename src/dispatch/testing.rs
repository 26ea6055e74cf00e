//! Scripted completion provider for unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::completion::{
    CallParameters, ChatCompletion, ChatMessage, Choice, CompletionProvider, ResponseMessage, Role,
    Usage,
};
use crate::error::CompletionError;

/// Replies `answer:<last user message>`. Behavior is keyed on the last user
/// message: per-key latency, permanent failure, or failure for the first N
/// calls. Tracks call counts and the concurrent-call high-water mark.
#[derive(Default)]
pub(crate) struct StubProvider {
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    failing: HashSet<String>,
    fail_first: HashMap<String, usize>,
    calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
    per_key: Mutex<HashMap<String, usize>>,
    finished: Mutex<Vec<String>>,
}

impl StubProvider {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn delay(mut self, key: &str, delay: Duration) -> Self {
        self.delays.insert(key.to_string(), delay);
        self
    }

    pub(crate) fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    pub(crate) fn always_fail(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    pub(crate) fn fail_first(mut self, key: &str, times: usize) -> Self {
        self.fail_first.insert(key.to_string(), times);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn calls_for(&self, key: &str) -> usize {
        self.per_key.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub(crate) fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Keys in the order their calls returned
    pub(crate) fn finish_order(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

pub(crate) fn completion_for(key: &str, model: &str) -> ChatCompletion {
    ChatCompletion {
        id: format!("cmpl-{}", key),
        created: 1_700_000_000,
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: Role::Assistant,
                content: Some(format!("answer:{}", key)),
            },
            finish_reason: Some("stop".to_string()),
        }],
        usage: Usage {
            prompt_tokens: 10,
            completion_tokens: 2,
            total_tokens: 12,
        },
    }
}

#[async_trait]
impl CompletionProvider for StubProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &CallParameters,
    ) -> Result<ChatCompletion, CompletionError> {
        let key = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let attempt = {
            let mut per_key = self.per_key.lock().unwrap();
            let count = per_key.entry(key.clone()).or_insert(0);
            *count += 1;
            *count
        };
        self.calls.fetch_add(1, Ordering::SeqCst);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(&key).copied().unwrap_or(self.default_delay);
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        self.finished.lock().unwrap().push(key.clone());

        let failing_now = self.failing.contains(&key)
            || self.fail_first.get(&key).map_or(false, |n| attempt <= *n);
        if failing_now {
            return Err(CompletionError::ServiceUnavailable(format!("stubbed failure for {}", key)));
        }

        Ok(completion_for(&key, &params.model))
    }
}
