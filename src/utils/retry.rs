// src/utils/retry.rs

//! Bounded retry with exponential backoff for store calls.
//!
//! Every attempt runs under a timeout. Only `AppError::TransientStore`
//! (including an elapsed timeout) is retried; every other error is returned
//! to the caller on the first occurrence.
//!
//! A timeout can fire after a write has committed but before its reply
//! arrived, so a retried write may find its own earlier effect. Writes keep a
//! key across attempts (bookings, wallet entries) or use the attempt index
//! from [`with_retry_attempts`] to recognise it (status transitions).

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, timeout};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
    /// Upper bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
            multiplier: 2,
            attempt_timeout: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// delay = initial_delay * multiplier^attempt, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt as u32);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the retry budget is spent.
///
/// A timed-out attempt is dropped, which rolls back any open transaction
/// unless the commit itself was already sent.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    with_retry_attempts(policy, op_name, |_| operation()).await
}

/// Same as [`with_retry`], but `operation` receives the attempt index
/// (0 for the first call).
pub async fn with_retry_attempts<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut operation: F,
) -> Result<T, AppError>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0;

    loop {
        let result = match timeout(policy.attempt_timeout, operation(attempt)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::TransientStore(format!(
                "{} timed out after {:?}",
                op_name, policy.attempt_timeout
            ))),
        };

        match result {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(op = op_name, attempt, "Store call succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    op = op_name,
                    attempt,
                    error = %err,
                    "Transient store failure, retrying in {:?}",
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
