//! Observers for batch progress. Purely informational: sinks never affect
//! ordering or control flow.

use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use tracing::info;

/// One request of a batch has finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent<'a> {
    pub label: &'a str,
    /// Requests finished so far, this one included
    pub completed: usize,
    pub total: usize,
}

/// Receives completion events in arrival order
pub trait ProgressSink: Send + Sync {
    fn on_start(&self, _label: &str, _total: usize) {}

    fn on_complete(&self, event: &ProgressEvent<'_>);

    fn on_finish(&self, _label: &str) {}
}

/// Discards all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn on_complete(&self, _event: &ProgressEvent<'_>) {}
}

/// Logs each completion at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn on_complete(&self, event: &ProgressEvent<'_>) {
        info!(
            label = event.label,
            completed = event.completed,
            total = event.total,
            "{}: {}/{}", event.label, event.completed, event.total
        );
    }
}

/// Terminal progress bar
pub struct BarProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{spinner:.green} {msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%)")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for BarProgress {
    fn on_start(&self, label: &str, total: usize) {
        let bar = ProgressBar::new(total as u64);
        bar.set_style(Self::style());
        bar.set_message(label.to_string());
        if let Ok(mut slot) = self.bar.lock() {
            *slot = Some(bar);
        }
    }

    fn on_complete(&self, event: &ProgressEvent<'_>) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(bar) = slot.as_ref() {
                bar.set_position(event.completed as u64);
            }
        }
    }

    fn on_finish(&self, _label: &str) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(bar) = slot.take() {
                bar.finish();
            }
        }
    }
}
