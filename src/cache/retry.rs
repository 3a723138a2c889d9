//! Bounded retries with exponential backoff

use crate::cache::config::RetryConfig;
use crate::error::{CacheError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy for collaborator calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_delay: Duration,
    backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Build the policy from configuration
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_delay: config.initial_delay,
            backoff_multiplier: config.backoff_multiplier,
        }
    }

    /// Total attempts, first one included
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Run `operation` until it succeeds or attempts run out.
    ///
    /// Errors that [`CacheError::is_retryable`] rejects are returned as-is on
    /// the first failure. Exhaustion yields [`CacheError::OperationFailed`].
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut f: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut retry_count = 0;

        loop {
            match f().await {
                Ok(value) => {
                    if retry_count > 0 {
                        debug!("{} succeeded after {} retries", operation, retry_count);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    debug!("{} failed with non-retryable {} error: {}", operation, e.kind(), e);
                    return Err(e);
                }
                Err(e) if retry_count >= self.max_retries => {
                    return Err(CacheError::OperationFailed {
                        operation: operation.to_string(),
                        attempts: retry_count + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    retry_count += 1;
                    let delay = self.delay_for(retry_count);
                    warn!(
                        "{} failed (attempt {}/{}), retrying after {:?}: {}",
                        operation,
                        retry_count,
                        self.max_attempts(),
                        delay,
                        e
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
    use std::sync::Arc;

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(&RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        })
    }

    #[test]
    fn test_backoff_schedule() {
        let p = policy(3);
        assert_eq!(p.delay_for(1), Duration::from_millis(100));
        assert_eq!(p.delay_for(2), Duration::from_millis(200));
        assert_eq!(p.delay_for(3), Duration::from_millis(400));
        assert_eq!(p.max_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = tokio::time::Instant::now();

        let result = policy(3)
            .execute("query", || {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CacheError::ConnectionError("refused".to_string()))
                    } else {
                        Ok("answer")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 100ms + 200ms of backoff on the paused clock
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_last_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = policy(2)
            .execute("store", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(CacheError::StoreError("busy".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(CacheError::OperationFailed {
                operation,
                attempts,
                source,
            }) => {
                assert_eq!(operation, "store");
                assert_eq!(attempts, 3);
                assert!(matches!(*source, CacheError::StoreError(_)));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_fails_fast() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<()> = policy(5)
            .execute("query", || {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(CacheError::InvalidFilter("bad syntax".to_string()))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(CacheError::InvalidFilter(_))));
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let result: Result<()> = policy(0)
            .execute("embed", || async {
                Err(CacheError::EmbeddingError("down".to_string()))
            })
            .await;

        assert!(matches!(
            result,
            Err(CacheError::OperationFailed { attempts: 1, .. })
        ));
    }
}
