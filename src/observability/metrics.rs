//! Dispatch metrics collection and reporting

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Point-in-time view of [`DispatchMetrics`]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSnapshot {
    /// Remote calls made, including retries
    pub attempts: u64,

    /// Requests that ended with an accepted response
    pub successes: u64,

    /// Remote calls that returned an error
    pub call_failures: u64,

    /// Responses rejected by the validator
    pub rejections: u64,

    /// Requests that ran out of retries
    pub abandoned: u64,

    /// Requests currently holding an admission permit
    pub in_flight: usize,

    /// Highest `in_flight` value observed
    pub peak_in_flight: usize,

    /// Average remote call latency (ms)
    pub avg_call_latency_ms: f64,

    pub uptime_secs: u64,
}

/// Latency histogram buckets (in milliseconds)
const LATENCY_BUCKETS: &[f64] = &[50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0];

/// Histogram for tracking latency distribution
#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<(f64, Arc<AtomicU64>)>,
    sum: Arc<AtomicU64>,
    count: Arc<AtomicU64>,
}

impl Histogram {
    fn new(buckets: &[f64]) -> Self {
        let bucket_counters = buckets
            .iter()
            .map(|&b| (b, Arc::new(AtomicU64::new(0))))
            .collect();

        Self {
            buckets: bucket_counters,
            sum: Arc::new(AtomicU64::new(0)),
            count: Arc::new(AtomicU64::new(0)),
        }
    }

    fn observe(&self, value: f64) {
        self.sum.fetch_add(value as u64, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        // Cumulative buckets
        for (bucket, counter) in &self.buckets {
            if value <= *bucket {
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn mean(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64
    }

    fn export_prometheus(&self, name: &str, help: &str) -> String {
        let mut output = String::new();

        output.push_str(&format!("# HELP {} {}\n", name, help));
        output.push_str(&format!("# TYPE {} histogram\n", name));

        for (bucket, counter) in &self.buckets {
            let count = counter.load(Ordering::Relaxed);
            output.push_str(&format!("{}_bucket{{le=\"{}\"}} {}\n", name, bucket, count));
        }

        let total_count = self.count.load(Ordering::Relaxed);
        output.push_str(&format!("{}_bucket{{le=\"+Inf\"}} {}\n", name, total_count));

        let sum = self.sum.load(Ordering::Relaxed) as f64;
        output.push_str(&format!("{}_sum {:.3}\n", name, sum));
        output.push_str(&format!("{}_count {}\n", name, total_count));

        output
    }
}

/// Lock-free counters shared by every invoker and dispatcher they are
/// attached to
pub struct DispatchMetrics {
    start_time: Instant,
    attempts: AtomicU64,
    successes: AtomicU64,
    call_failures: AtomicU64,
    rejections: AtomicU64,
    abandoned: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    call_latency: Histogram,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            attempts: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            call_failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            abandoned: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            call_latency: Histogram::new(LATENCY_BUCKETS),
        }
    }

    /// Record one remote call and its latency
    pub fn record_attempt(&self, latency: Duration) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.call_latency.observe(latency.as_millis() as f64);
    }

    pub fn record_success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_call_failure(&self) {
        self.call_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_abandoned(&self) {
        self.abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// A request acquired an admission permit
    pub fn enter_gate(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    /// A request released its admission permit
    pub fn leave_gate(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            call_failures: self.call_failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.peak_in_flight.load(Ordering::SeqCst),
            avg_call_latency_ms: self.call_latency.mean(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let m = self.snapshot();

        let mut output = format!(
            "# HELP chat_dispatch_attempts_total Remote calls made, including retries\n\
             # TYPE chat_dispatch_attempts_total counter\n\
             chat_dispatch_attempts_total {}\n\
             \n\
             # HELP chat_dispatch_successes_total Requests completed with an accepted response\n\
             # TYPE chat_dispatch_successes_total counter\n\
             chat_dispatch_successes_total {}\n\
             \n\
             # HELP chat_dispatch_call_failures_total Remote calls that failed\n\
             # TYPE chat_dispatch_call_failures_total counter\n\
             chat_dispatch_call_failures_total {}\n\
             \n\
             # HELP chat_dispatch_rejections_total Responses rejected by validation\n\
             # TYPE chat_dispatch_rejections_total counter\n\
             chat_dispatch_rejections_total {}\n\
             \n\
             # HELP chat_dispatch_abandoned_total Requests that exhausted their retries\n\
             # TYPE chat_dispatch_abandoned_total counter\n\
             chat_dispatch_abandoned_total {}\n\
             \n\
             # HELP chat_dispatch_in_flight Requests holding an admission permit\n\
             # TYPE chat_dispatch_in_flight gauge\n\
             chat_dispatch_in_flight {}\n\
             \n",
            m.attempts, m.successes, m.call_failures, m.rejections, m.abandoned, m.in_flight,
        );

        output.push_str(&self.call_latency.export_prometheus(
            "chat_dispatch_call_duration_ms",
            "Remote call duration in milliseconds"
        ));

        output
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}
