//! Counters for the beacon daemon.
//!
//! All counters are backed by atomics for lock-free concurrent access.

use std::sync::atomic::{AtomicU64, Ordering};

use beacon::Round;

/// Aggregated daemon metrics, shared via `Arc<Metrics>`.
#[derive(Debug, Default)]
pub struct Metrics {
    /// Completed poll cycles.
    pub cycles: AtomicU64,
    /// Last round seen by the poller.
    pub last_round: AtomicU64,
    /// Ledger size at the end of the last cycle.
    pub pending_requests: AtomicU64,
    /// Requests whose target round had not yet arrived when seen.
    pub requests_not_ready: AtomicU64,
    pub requests_fulfilled: AtomicU64,
    pub requests_cancelled: AtomicU64,
    /// Submissions refused for a benign reason, e.g. already settled.
    pub requests_skipped: AtomicU64,
    /// Submissions that failed and will be retried next cycle.
    pub requests_failed: AtomicU64,
    /// Sum of rounds between target round and completion.
    pub lateness_sum_rounds: AtomicU64,
    /// Sum of submission latencies in milliseconds.
    pub fulfillment_latency_sum_ms: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_cycle(&self, last_round: Round, pending: u64) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.last_round.store(last_round, Ordering::Relaxed);
        self.pending_requests.store(pending, Ordering::Relaxed);
    }

    pub fn record_not_ready(&self) {
        self.requests_not_ready.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful completion with its lateness and latency.
    pub fn record_fulfillment(&self, lateness: u64, latency_ms: u64) {
        self.requests_fulfilled.fetch_add(1, Ordering::Relaxed);
        self.lateness_sum_rounds.fetch_add(lateness, Ordering::Relaxed);
        self.fulfillment_latency_sum_ms
            .fetch_add(latency_ms, Ordering::Relaxed);
    }

    pub fn record_cancellation(&self) {
        self.requests_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.requests_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Average fulfillment latency in milliseconds, or 0 if none.
    pub fn avg_latency_ms(&self) -> u64 {
        let count = self.requests_fulfilled.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.fulfillment_latency_sum_ms.load(Ordering::Relaxed) / count
    }

    pub fn avg_lateness_rounds(&self) -> u64 {
        let count = self.requests_fulfilled.load(Ordering::Relaxed);
        if count == 0 {
            return 0;
        }
        self.lateness_sum_rounds.load(Ordering::Relaxed) / count
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles": self.cycles.load(Ordering::Relaxed),
            "last_round": self.last_round.load(Ordering::Relaxed),
            "pending_requests": self.pending_requests.load(Ordering::Relaxed),
            "requests_not_ready": self.requests_not_ready.load(Ordering::Relaxed),
            "requests_fulfilled": self.requests_fulfilled.load(Ordering::Relaxed),
            "requests_cancelled": self.requests_cancelled.load(Ordering::Relaxed),
            "requests_skipped": self.requests_skipped.load(Ordering::Relaxed),
            "requests_failed": self.requests_failed.load(Ordering::Relaxed),
            "avg_lateness_rounds": self.avg_lateness_rounds(),
            "avg_fulfillment_latency_ms": self.avg_latency_ms(),
        })
    }
}
