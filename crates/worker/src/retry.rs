//! Exponential-backoff retry for job store writes.
//!
//! Only [`StoreError::Transient`] is retried. Rejections and missing jobs
//! are returned on the first attempt.

use std::future::Future;
use std::time::Duration;

use lookgen_core::types::JobId;
use lookgen_db::StoreError;
use rand::Rng;

/// Tunable parameters for store retries.
#[derive(Debug, Clone)]
pub struct StoreRetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for StoreRetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay, clamped to `max_delay`.
pub fn next_delay(current: Duration, policy: &StoreRetryPolicy) -> Duration {
    let next_ms = (current.as_millis() as f64 * policy.multiplier) as u64;
    Duration::from_millis(next_ms).min(policy.max_delay)
}

/// Pick a delay uniformly from `[delay / 2, delay]` so retrying writers
/// spread out.
pub fn jittered(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    Duration::from_millis(rand::rng().random_range(ms / 2..=ms))
}

impl StoreRetryPolicy {
    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    pub async fn run<T, F, Fut>(
        &self,
        op: &str,
        job_id: JobId,
        mut attempt_fn: F,
    ) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut delay = self.initial_delay;
        let mut attempt = 1;

        loop {
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    tracing::warn!(
                        %job_id,
                        op,
                        attempt,
                        error = %e,
                        "Store write failed, retrying",
                    );
                    tokio::time::sleep(jittered(delay)).await;
                    delay = next_delay(delay, self);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        tracing::error!(
                            %job_id,
                            op,
                            attempts,
                            error = %e,
                            "Store write failed after all retries",
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
