// =============================================================================
// rate_limiter.rs — ONE TOKEN PER WINDOW, NO EXCEPTIONS
// =============================================================================
//
// ToS;DR is a small volunteer project. Its catalog API is happy with one
// request every 1.5 seconds and the edit site with one every half second.
// Beyond that we get 429s, and we deserve them.
//
// Each client owns exactly one limiter. Every request a batch schedules
// waits on that same limiter, so concurrency comes from many suspended tasks
// queueing for one token schedule, not from many limiters each thinking it
// has the place to itself.
//
// The bucket itself is governor's GCRA with a burst of one: permits are at
// least one window apart and an idle limiter never banks extra tokens. This
// wrapper only adds a name and the counters that end up in batch logs.
//
// governor keeps its own clock, not tokio's, so paused-time tests don't move
// it.
// =============================================================================

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use governor::clock::Clock;
use governor::{DefaultDirectRateLimiter, Quota};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct LimiterStats {
    permits_granted: AtomicU64,
    total_wait_us: AtomicU64,
}

/// A shared one-token limiter. Clones share the same schedule.
#[derive(Clone)]
pub struct RateLimiter {
    /// Which upstream this limiter protects (e.g., "tosdr-api", "edit-site").
    name: String,

    /// One permit per window. A zero window disables limiting.
    window: Duration,

    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    stats: Arc<LimiterStats>,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, window: Duration) -> Self {
        let name = name.into();
        let limiter = Quota::with_period(window)
            .map(|quota| Arc::new(DefaultDirectRateLimiter::direct(quota.allow_burst(NonZeroU32::MIN))));

        info!(
            name = %name,
            window_ms = window.as_millis() as u64,
            "Rate limiter initialized: one request per {:?}",
            window
        );

        Self {
            name,
            window,
            limiter,
            stats: Arc::new(LimiterStats::default()),
        }
    }

    /// Wait until this caller's permit comes up.
    pub async fn acquire(&self) {
        self.stats.permits_granted.fetch_add(1, Ordering::Relaxed);

        let Some(limiter) = &self.limiter else {
            return;
        };
        let not_until = match limiter.check() {
            Ok(()) => return,
            Err(not_until) => not_until,
        };

        debug!(
            name = %self.name,
            wait_ms = not_until.wait_time_from(limiter.clock().now()).as_millis() as u64,
            "Rate limiter: waiting for next slot"
        );

        let started = Instant::now();
        limiter.until_ready().await;
        self.stats
            .total_wait_us
            .fetch_add(started.elapsed().as_micros() as u64, Ordering::Relaxed);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn snapshot(&self) -> RateLimiterSnapshot {
        RateLimiterSnapshot {
            name: self.name.clone(),
            window_ms: self.window.as_millis() as u64,
            permits_granted: self.stats.permits_granted.load(Ordering::Relaxed),
            total_wait_ms: self.stats.total_wait_us.load(Ordering::Relaxed) / 1_000,
        }
    }
}

/// A serializable view of the limiter, logged with batch summaries.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct RateLimiterSnapshot {
    pub name: String,
    pub window_ms: u64,
    pub permits_granted: u64,
    pub total_wait_ms: u64,
}
