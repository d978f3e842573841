//! Retry Module - Retry and backoff utilities
//!
//! Used by the AI diagnosis proxy; delays are fixed by the policy, no jitter.

use std::future::Future;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffStrategy,
}

#[derive(Clone, Copy, Debug)]
pub enum BackoffStrategy {
    Constant,
    Exponential,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Delay to sleep after a failed `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = match self.backoff {
            BackoffStrategy::Constant => self.initial_delay,
            BackoffStrategy::Exponential => {
                self.initial_delay * 2_u32.saturating_pow(attempt.saturating_sub(1))
            }
        };
        base.min(self.max_delay)
    }
}

#[derive(Debug)]
pub struct RetryResult<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

pub struct Retry;

impl Retry {
    /// Execute `f` until it succeeds, `retryable` rejects the error, or the
    /// attempt cap is reached. A non-retryable error is returned immediately.
    pub async fn execute_if<F, Fut, T, E, R>(
        policy: &RetryPolicy,
        mut f: F,
        retryable: R,
    ) -> RetryResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        R: Fn(&E) -> bool,
    {
        let mut attempts = 0;

        loop {
            attempts += 1;
            match f().await {
                Ok(value) => {
                    return RetryResult {
                        result: Ok(value),
                        attempts,
                    }
                }
                Err(e) => {
                    if attempts >= policy.max_attempts || !retryable(&e) {
                        return RetryResult {
                            result: Err(e),
                            attempts,
                        };
                    }
                    let delay = policy.delay_for_attempt(attempts);
                    tracing::warn!(
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::default()
            .with_attempts(attempts)
            .with_delay(Duration::from_millis(1))
    }

    #[test]
    fn exponential_delays() {
        let p = RetryPolicy::default().with_delay(Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(p.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn delay_is_capped() {
        let p = RetryPolicy::default().with_delay(Duration::from_secs(20));
        assert_eq!(p.delay_for_attempt(5), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let out = Retry::execute_if(
            &fast_policy(4),
            || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("transient")
                } else {
                    Ok(7)
                }
            },
            |_| true,
        )
        .await;
        assert_eq!(out.result.unwrap(), 7);
        assert_eq!(out.attempts, 3);
    }

    #[tokio::test]
    async fn non_retryable_fails_fast() {
        let calls = AtomicU32::new(0);
        let out: RetryResult<(), &str> = Retry::execute_if(
            &fast_policy(4),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("forbidden")
            },
            |e| *e != "forbidden",
        )
        .await;
        assert!(out.result.is_err());
        assert_eq!(out.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_at_attempt_cap() {
        let out: RetryResult<(), &str> =
            Retry::execute_if(&fast_policy(3), || async { Err("transient") }, |_| true).await;
        assert!(out.result.is_err());
        assert_eq!(out.attempts, 3);
    }
}
