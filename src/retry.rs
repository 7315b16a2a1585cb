// =============================================================================
// retry.rs — BACKING OFF WHEN ASKED NICELY
// =============================================================================
//
// Exactly one thing gets retried: an HTTP 429 inside a concurrent batch.
// A 500, a 404, a refused connection, a timeout, a payload that doesn't
// parse: all of those give up on the spot. Upstream only ever told us how
// to behave about rate limiting, so that's the only thing we retry.
//
// Delays grow as base * 2^(n-1), capped at max_delay, so they never shrink
// from one attempt to the next. At most `max_attempts` tries in total.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::Config;
use crate::error::ClientError;
use crate::metrics::ClientMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total tries, the first one included.
    pub max_attempts: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base: config.backoff_base,
            max_delay: config.backoff_max,
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Run `op` until it succeeds, fails with anything but a 429, or runs out
/// of attempts. `op` receives the 1-based attempt number.
pub async fn retry_rate_limited<T, F, Fut>(
    policy: &BackoffPolicy,
    metrics: &ClientMetrics,
    what: &str,
    mut op: F,
) -> Result<T, ClientError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ClientError>>,
{
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_rate_limited() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                metrics.increment_retries();
                warn!(
                    what = what,
                    attempt = attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Rate limited (HTTP 429), backing off before retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn policy(max_attempts: u32) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts,
            base: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
        }
    }

    fn status(code: u16) -> ClientError {
        ClientError::HttpStatus {
            status: code,
            url: "http://localhost/service/v1".into(),
        }
    }

    #[test]
    fn test_delays_never_shrink_and_are_capped() {
        let p = policy(10);
        let delays: Vec<Duration> = (1..=20).map(|n| p.delay_for(n)).collect();
        assert_eq!(delays[0], Duration::from_millis(100));
        assert_eq!(delays[1], Duration::from_millis(200));
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert!(delays.iter().all(|d| *d <= Duration::from_secs(1)));
        assert_eq!(p.delay_for(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_429_gives_up_immediately() {
        let metrics = ClientMetrics::new();
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_rate_limited(&policy(10), &metrics, "test", |_| {
            calls.set(calls.get() + 1);
            async { Err(status(500)) }
        })
        .await;

        assert_eq!(result.unwrap_err().status(), Some(500));
        assert_eq!(calls.get(), 1);
        assert_eq!(metrics.snapshot().retries, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_retries_until_attempts_run_out() {
        let metrics = ClientMetrics::new();
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_rate_limited(&policy(4), &metrics, "test", |_| {
            calls.set(calls.get() + 1);
            async { Err(status(429)) }
        })
        .await;

        assert!(result.unwrap_err().is_rate_limited());
        assert_eq!(calls.get(), 4);
        assert_eq!(metrics.snapshot().retries, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_429_then_success() {
        let metrics = ClientMetrics::new();
        let result = retry_rate_limited(&policy(10), &metrics, "test", |attempt| async move {
            if attempt < 3 {
                Err(status(429))
            } else {
                Ok(attempt)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }
}
