//! Bounded-attempt retry for network-bound operations
//!
//! Only failures classified as transient are retried. Everything else is
//! returned after the first attempt.
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Success | Return the value |
//! | Transient error, attempts left | Sleep, try again |
//! | Transient error, last attempt | `RetryableExhausted` |
//! | Any other error | `Fatal`, no retry |

use crate::api::ApiError;
use crate::config::{BackoffKind, CrawlerConfig};
use std::fmt;
use std::future::Future;
use std::time::Duration;

/// Classification hook for retryable errors
pub trait Retryable {
    fn is_transient(&self) -> bool;
}

impl Retryable for ApiError {
    fn is_transient(&self) -> bool {
        ApiError::is_transient(self)
    }
}

/// Why a task gave up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Every attempt failed with a transient error
    RetryableExhausted,
    /// A non-transient error, or a failure outside any network call
    Fatal,
}

/// Terminal failure of a retried operation or of a whole task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub kind: FailureKind,
    /// The last error seen
    pub message: String,
    /// Attempts made by the failing call
    pub attempts: u32,
}

impl TaskFailure {
    /// A failure that did not come from a network call (storage, panics)
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: message.into(),
            attempts: 0,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            FailureKind::RetryableExhausted => {
                write!(f, "{} (gave up after {} attempts)", self.message, self.attempts)
            }
            FailureKind::Fatal => write!(f, "{}", self.message),
        }
    }
}

/// Attempt limit and delay schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    backoff: BackoffKind,
}

impl RetryPolicy {
    /// Creates a policy; `max_attempts` counts the first try and is at least 1
    pub fn new(max_attempts: u32, delay: Duration, backoff: BackoffKind) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff,
        }
    }

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_delay),
            config.retry_backoff,
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => self.delay,
            BackoffKind::Linear => self.delay.saturating_mul(attempt.max(1)),
        }
    }

    /// Runs `operation` until it succeeds, fails fatally, or runs out of attempts
    ///
    /// # Arguments
    ///
    /// * `label` - What is being fetched, for log lines
    /// * `operation` - Produces a fresh attempt each time it is called
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - The first successful value
    /// * `Err(TaskFailure)` - `Fatal` on a non-transient error, otherwise
    ///   `RetryableExhausted` carrying the last error
    pub async fn execute<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, TaskFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + fmt::Display,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_transient() => {
                    return Err(TaskFailure {
                        kind: FailureKind::Fatal,
                        message: e.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) if attempt >= self.max_attempts => {
                    return Err(TaskFailure {
                        kind: FailureKind::RetryableExhausted,
                        message: e.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    tracing::debug!(
                        "{} attempt {}/{} failed: {}; retrying in {:?}",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}
