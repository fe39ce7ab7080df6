//! Bounded retries for transient failures
//!
//! Summarization calls and snapshot writes go through [`RetryPolicy`] before the
//! caller falls back to a local alternative.

pub mod backoff;
pub mod retry;

#[cfg(test)]
mod tests;

pub use backoff::{BackoffConfig, BackoffStrategy, ExponentialBackoff};
pub use retry::{RetryConfig, RetryPolicy, RetryResult};
