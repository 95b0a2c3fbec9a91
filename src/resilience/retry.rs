//! Retry with exponential backoff for recoverable errors
//!
//! Only errors classified retryable by [`ServiceError::is_retryable`] are
//! retried; validation and other permanent failures return immediately.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;

use crate::error::{Result, ServiceError};

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 means no retries)
    pub max_retries: u32,

    /// Initial backoff duration
    pub initial_interval: Duration,

    /// Maximum backoff duration
    pub max_interval: Duration,

    /// Multiplier for backoff between retries
    pub multiplier: f64,

    /// Whether to add randomization to backoff intervals
    pub randomization_factor: f64,

    /// Maximum total time to spend retrying
    pub max_elapsed_time: Option<Duration>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            randomization_factor: 0.2,
            max_elapsed_time: Some(Duration::from_secs(20)),
        }
    }
}

impl fmt::Display for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryConfig {{ max_retries: {}, initial_interval: {:?}, max_interval: {:?} }}",
            self.max_retries, self.initial_interval, self.max_interval
        )
    }
}

/// Executor for retry operations with exponential backoff
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl RetryExecutor {
    /// Create a new retry executor with the specified configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Execute a fallible operation with retries according to the
    /// configuration. The factory is invoked once per attempt.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.initial_interval,
            max_interval: self.config.max_interval,
            multiplier: self.config.multiplier,
            randomization_factor: self.config.randomization_factor,
            max_elapsed_time: self.config.max_elapsed_time,
            ..ExponentialBackoff::default()
        };

        let mut attempts = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempts < self.config.max_retries => {
                    match backoff.next_backoff() {
                        Some(backoff_duration) => {
                            log::warn!(
                                "Operation failed with retryable error, retrying in {:?} (attempt {}/{}): {}",
                                backoff_duration,
                                attempts + 1,
                                self.config.max_retries,
                                err
                            );
                            tokio::time::sleep(backoff_duration).await;
                            attempts += 1;
                        }
                        None => return Err(err),
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Get the current retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(20),
            ..RetryConfig::default()
        }
    }

    #[tokio::test]
    async fn successful_operation_runs_once() {
        let retry = RetryExecutor::new(fast_config(2));
        let result = retry.execute(|| async { Ok::<_, ServiceError>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_transient_failures() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let retry = RetryExecutor::new(fast_config(2));

        let counter = Arc::clone(&attempts);
        let result = retry
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ServiceError::network("transient"))
                    } else {
                        Ok::<_, ServiceError>(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let retry = RetryExecutor::new(fast_config(3));

        let counter = Arc::clone(&attempts);
        let result: Result<()> = retry
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ServiceError::validation("bad payload"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let retry = RetryExecutor::new(fast_config(2));

        let counter = Arc::clone(&attempts);
        let result: Result<()> = retry
            .execute(|| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(ServiceError::timeout("still down"))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // Initial + 2 retries
    }
}
