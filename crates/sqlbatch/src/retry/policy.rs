//! Retry execution

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use sqlbatch_core::{BatchError, Result};
use tokio::time::Instant;

use super::BackoffStrategy;

/// How often and how patiently to retry an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_retries: u32,
    backoff: BackoffStrategy,
    timeout: Option<Duration>,
    retryable_only: bool,
}

/// Snapshot of a policy's configuration, for logs and diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryInfo {
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub timeout: Option<Duration>,
    pub retryable_only: bool,
}

impl RetryPolicy {
    /// Up to `max_retries` additional attempts with the default backoff.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: BackoffStrategy::default(),
            timeout: None,
            retryable_only: false,
        }
    }

    /// A policy that runs the operation exactly once.
    pub fn no_retry() -> Self {
        Self::new(0).with_backoff(BackoffStrategy::immediate())
    }

    pub fn with_backoff(mut self, backoff: BackoffStrategy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Limit each attempt to `timeout`; an expired attempt counts as a
    /// retryable failure.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Give up at once on errors that are not
    /// [retryable](BatchError::is_retryable) instead of retrying every error.
    pub fn retryable_only(mut self) -> Self {
        self.retryable_only = true;
        self
    }

    pub fn is_retryable_only(&self) -> bool {
        self.retryable_only
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total number of attempts the policy allows.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn backoff(&self) -> &BackoffStrategy {
        &self.backoff
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn retry_info(&self) -> RetryInfo {
        RetryInfo {
            max_retries: self.max_retries,
            retry_delay: self.backoff.initial_delay(),
            max_delay: self.backoff.max_delay(),
            backoff_multiplier: self.backoff.multiplier(),
            timeout: self.timeout,
            retryable_only: self.retryable_only,
        }
    }

    /// Run `operation` under this policy.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        execute_with_retry(self, operation).await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// One failed attempt; lives only for the duration of a retry loop.
struct RetryAttempt<'a> {
    number: u32,
    elapsed: Duration,
    error: &'a BatchError,
}

impl RetryAttempt<'_> {
    fn log(&self, max_attempts: u32, delay: Duration) {
        tracing::warn!(
            attempt = self.number,
            max_attempts,
            elapsed_ms = self.elapsed.as_millis() as u64,
            delay_ms = delay.as_millis() as u64,
            error = %self.error,
            "attempt failed; retrying"
        );
    }
}

/// Invoke `operation` until it succeeds or the policy gives up.
///
/// Every error is retried, unless the policy is
/// [`retryable_only`](RetryPolicy::retryable_only), in which case errors that
/// are not retryable are returned as-is. Exhausting the budget returns
/// [`BatchError::MaxRetriesExceeded`] wrapping the last error. A zero delay
/// still yields to the scheduler between attempts.
pub async fn execute_with_retry<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut number = 0;

    loop {
        number += 1;
        let started = Instant::now();

        let result = match policy.timeout {
            Some(limit) => match tokio::time::timeout(limit, operation()).await {
                Ok(result) => result,
                Err(_) => Err(BatchError::Timeout(limit)),
            },
            None => operation().await,
        };

        let error = match result {
            Ok(value) => {
                if number > 1 {
                    tracing::debug!(attempt = number, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        if policy.retryable_only && !error.is_retryable() {
            return Err(error);
        }
        if number >= max_attempts {
            tracing::warn!(attempts = number, error = %error, "retries exhausted");
            return Err(BatchError::MaxRetriesExceeded {
                max_retries: policy.max_retries,
                attempts: number,
                source: Box::new(error),
            });
        }

        let delay = policy.backoff.calculate_delay(number - 1);
        RetryAttempt {
            number,
            elapsed: started.elapsed(),
            error: &error,
        }
        .log(max_attempts, delay);

        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(delay).await;
        }
    }
}
