//! Retry policies for transient failures

use super::backoff::{BackoffConfig, BackoffStrategy, ExponentialBackoff};
use crate::error::TallyError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Retry behavior shared by summarization and snapshot I/O
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, first try included
    pub max_attempts: u32,
    /// Maximum total time to spend retrying
    #[serde(with = "humantime_serde")]
    pub max_duration: Duration,
    /// Initial delay before first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Backoff multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Add random jitter to prevent thundering herd
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            max_duration: Duration::from_secs(300),
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// A config that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            max_duration: Duration::from_secs(300),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = duration;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Convert to BackoffConfig for use with backoff strategies
    pub fn to_backoff_config(&self) -> BackoffConfig {
        BackoffConfig {
            initial_delay: self.initial_delay,
            max_delay: self.max_delay,
            multiplier: self.backoff_multiplier,
            jitter: self.jitter,
            jitter_ratio: 0.2,
        }
    }
}

/// Result of a retried operation
#[derive(Debug)]
pub enum RetryResult<T> {
    Success(T),
    /// Failed after exhausting attempts, or on a non-retryable error
    Failed {
        error: TallyError,
        attempts: u32,
        elapsed: Duration,
    },
    Cancelled,
}

impl<T> RetryResult<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Convert to a Result, mapping cancellation to [`TallyError::Cancelled`]
    pub fn into_result(self) -> Result<T, TallyError> {
        match self {
            Self::Success(v) => Ok(v),
            Self::Failed { error, .. } => Err(error),
            Self::Cancelled => Err(TallyError::Cancelled),
        }
    }
}

/// Executes operations with bounded exponential backoff
pub struct RetryPolicy {
    config: RetryConfig,
    backoff: Box<dyn BackoffStrategy>,
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::with_config(RetryConfig::default())
    }

    pub fn with_config(config: RetryConfig) -> Self {
        let backoff = ExponentialBackoff::with_config(config.to_backoff_config());
        Self {
            config,
            backoff: Box::new(backoff),
        }
    }

    /// Set custom backoff strategy
    pub fn with_backoff<B: BackoffStrategy + 'static>(mut self, backoff: B) -> Self {
        self.backoff = Box::new(backoff);
        self
    }

    /// Whether `error` on 0-indexed `attempt` should be retried
    pub fn should_retry(&self, error: &TallyError, attempt: u32) -> bool {
        attempt + 1 < self.config.max_attempts && error.is_retryable()
    }

    /// Execute an operation with retries
    pub async fn execute<T, F, Fut>(
        &self,
        mut operation: F,
        cancel_token: Option<CancellationToken>,
    ) -> RetryResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TallyError>>,
    {
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            if let Some(ref token) = cancel_token {
                if token.is_cancelled() {
                    return RetryResult::Cancelled;
                }
            }

            let error = match operation().await {
                Ok(result) => return RetryResult::Success(result),
                Err(error) => error,
            };

            if !self.should_retry(&error, attempt) || start.elapsed() >= self.config.max_duration {
                return RetryResult::Failed {
                    error,
                    attempts: attempt + 1,
                    elapsed: start.elapsed(),
                };
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            tracing::debug!(
                "Attempt {} failed ({}), retrying in {:?}",
                attempt + 1,
                error,
                delay
            );
            attempt += 1;

            if let Some(ref token) = cancel_token {
                tokio::select! {
                    _ = token.cancelled() => return RetryResult::Cancelled,
                    _ = sleep(delay) => {}
                }
            } else {
                sleep(delay).await;
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
