//! Retry with exponential backoff for transient portal failures.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;

use crate::Error;

/// Backoff schedule for retrying transient fetch failures.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Retries after the first attempt (so `max_retries = 3` means up to
    /// four requests on the wire).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on a single backoff delay, jitter excluded.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying attempt number `attempt` (0-based):
    /// `base * 2^attempt` capped at `max_delay`, plus 0-250ms jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        let backoff = self
            .base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
        backoff + jitter
    }
}

/// Runs `operation`, retrying transient errors with exponential backoff.
///
/// Non-transient errors (auth, structure, client-side HTTP statuses) are
/// returned immediately; a transient error that survives the whole schedule
/// is surfaced as-is.
pub async fn with_retry<F, Fut, T>(policy: &BackoffPolicy, operation: F) -> Result<T, Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) if e.is_transient() && attempt < policy.max_retries => {
                let wait = policy.delay_for_attempt(attempt);
                tracing::debug!("transient failure ({}), retrying in {:?}", e, wait);
                sleep(wait).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
