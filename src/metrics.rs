// ═══════════════════════════════════════════════════════════════
// METRICS - How hard did we lean on the upstream, and how did it go
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters, one set per client. Concurrent tasks in a batch bump
// them without locks; a snapshot is logged when the batch finishes.
//
// - requests_sent: every request that actually went on the wire
// - rate_limited_responses: how many of those came back 429
// - retries: how many times the backoff policy slept and tried again
// - failed_items: pages/items dropped from a best-effort batch
// - records_parsed: records successfully validated into models

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// The metrics snapshot - what gets serialized into the batch summary log
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub requests_sent: u64,
    pub rate_limited_responses: u64,
    pub retries: u64,
    pub failed_items: u64,
    pub records_parsed: u64,
    pub uptime_seconds: u64,
}

/// Thread-safe atomic counters for one client
#[derive(Debug)]
pub struct ClientMetrics {
    requests_sent: AtomicU64,
    rate_limited_responses: AtomicU64,
    retries: AtomicU64,
    failed_items: AtomicU64,
    records_parsed: AtomicU64,
    start_time: Instant,
}

impl Default for ClientMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientMetrics {
    pub fn new() -> Self {
        Self {
            requests_sent: AtomicU64::new(0),
            rate_limited_responses: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            failed_items: AtomicU64::new(0),
            records_parsed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_requests(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rate_limited(&self) {
        self.rate_limited_responses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed_items(&self) {
        self.failed_items.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_records_parsed(&self, count: usize) {
        self.records_parsed.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            rate_limited_responses: self.rate_limited_responses.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            failed_items: self.failed_items.load(Ordering::Relaxed),
            records_parsed: self.records_parsed.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}
