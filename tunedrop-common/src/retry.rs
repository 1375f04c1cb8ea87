//! Retry policy for outbound pipeline calls
//!
//! A single policy object (attempt bound, inter-attempt delay, retryable-error
//! predicate) applied uniformly by the resolver, locator, and acquisition
//! engine instead of ad-hoc retry loops at each call site.

use crate::{Error, Result};
use std::time::Duration;

/// Bounded retry with a fixed inter-attempt delay.
///
/// **Algorithm:**
/// 1. Attempt operation
/// 2. If successful, return result
/// 3. If the error satisfies the retryable predicate and attempts remain:
///    log WARN, sleep the fixed delay, retry
/// 4. Otherwise return the error immediately
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `operation`, retrying transient failures ([`Error::is_transient`])
    /// up to the attempt bound.
    pub async fn run<F, Fut, T>(&self, operation_name: &str, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        self.run_if(operation_name, Error::is_transient, operation)
            .await
    }

    /// Run `operation`, retrying any error accepted by `retryable` up to the
    /// attempt bound. The final failing error is returned unchanged.
    pub async fn run_if<F, Fut, T, P>(
        &self,
        operation_name: &str,
        retryable: P,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
        P: Fn(&Error) -> bool,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if attempt > 1 {
                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    "Retrying operation"
                );
            }

            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = operation_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) => {
                    if !retryable(&err) {
                        return Err(err);
                    }

                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            max_attempts = self.max_attempts,
                            error = %err,
                            "Operation failed: attempt bound exhausted"
                        );
                        return Err(err);
                    }

                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = self.delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, will retry after delay"
                    );

                    tokio::time::sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn succeeds_first_attempt() {
        let result = quick().run("test_op", || async { Ok::<i32, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let attempts = AtomicU32::new(0);

        let result = quick()
            .run("test_op", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(Error::Network("connection reset".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_at_attempt_bound() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = quick()
            .run("test_op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Timeout) }
            })
            .await;

        assert!(matches!(result, Err(Error::Timeout)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_transient_fails_immediately() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = quick()
            .run("test_op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::NotFound("no artist".into())) }
            })
            .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn custom_predicate_widens_retry_set() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = quick()
            .run_if(
                "test_op",
                |e| e.is_transient() || matches!(e, Error::SourceBlocked),
                || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async { Err(Error::SourceBlocked) }
                },
            )
            .await;

        assert!(matches!(result, Err(Error::SourceBlocked)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
