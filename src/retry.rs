//! Shared retry and backoff helpers.
//!
//! The wake engine ladder, the planner HTTP client and the ADB connection
//! wait all back off linearly: the n-th retry waits `n × step`.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;

/// Linear backoff policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay unit multiplied by the attempt number.
    pub step: Duration,
    /// Upper bound applied to every computed delay.
    pub max_delay: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl Backoff {
    /// Create a linear backoff with the given step and no practical cap.
    pub fn linear(step: Duration) -> Self {
        Self {
            step,
            max_delay: Duration::MAX,
        }
    }

    /// Set the maximum delay.
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `attempt` (1-based). Attempt 0 has no delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.step.saturating_mul(attempt).min(self.max_delay)
    }
}

/// Run `op` up to `max_attempts` times, sleeping `backoff.delay_for(n)`
/// between attempt `n` and `n + 1`. Stops early when `retryable` rejects
/// an error.
///
/// Returns the first success, or the last error.
pub async fn retry_with<T, E, F, Fut, R>(
    max_attempts: u32,
    backoff: Backoff,
    mut retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: FnMut(&E) -> bool,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && retryable(&e) => {
                let delay = backoff.delay_for(attempt);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying");
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_linear_delays_increase() {
        let backoff = Backoff::linear(Duration::from_secs(1));
        assert_eq!(backoff.delay_for(0), Duration::ZERO);
        assert_eq!(backoff.delay_for(1), Duration::from_secs(1));
        assert_eq!(backoff.delay_for(3), Duration::from_secs(3));
    }

    #[test]
    fn test_max_delay_caps() {
        let backoff = Backoff::linear(Duration::from_millis(500))
            .with_max_delay(Duration::from_millis(1200));
        assert_eq!(backoff.delay_for(2), Duration::from_millis(1000));
        assert_eq!(backoff.delay_for(5), Duration::from_millis(1200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = retry_with(
            5,
            Backoff::linear(Duration::from_millis(10)),
            |_| true,
            |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err("not yet")
                    } else {
                        Ok(attempt)
                    }
                }
            },
        )
        .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), &str> = retry_with(
            5,
            Backoff::default(),
            |e: &&str| *e != "fatal",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("fatal") }
            },
        )
        .await;
        assert_eq!(result, Err("fatal"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
