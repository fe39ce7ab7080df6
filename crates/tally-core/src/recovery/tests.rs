//! Tests for retry and backoff

use super::*;
use crate::error::TallyError;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn fast_config(max_attempts: u32) -> RetryConfig {
    RetryConfig::default()
        .with_max_attempts(max_attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(2))
        .with_jitter(false)
}

#[test]
fn test_exponential_backoff_caps() {
    let backoff = ExponentialBackoff::with_config(BackoffConfig {
        initial_delay: Duration::from_millis(100),
        max_delay: Duration::from_millis(300),
        multiplier: 2.0,
        jitter: false,
        jitter_ratio: 0.0,
    });
    assert_eq!(backoff.delay_for_attempt(0), Duration::from_millis(100));
    assert_eq!(backoff.delay_for_attempt(1), Duration::from_millis(200));
    assert_eq!(backoff.delay_for_attempt(5), Duration::from_millis(300));
}

#[tokio::test]
async fn test_retry_succeeds_after_transient_failures() {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::with_config(fast_config(3));

    let counter = calls.clone();
    let result = policy
        .execute(
            || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(TallyError::storage("busy"))
                    } else {
                        Ok("saved")
                    }
                }
            },
            None,
        )
        .await;

    assert_eq!(result.into_result().unwrap(), "saved");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_retry_stops_on_permanent_error() {
    let calls = Arc::new(AtomicU32::new(0));
    let policy = RetryPolicy::with_config(fast_config(5));

    let counter = calls.clone();
    let result: RetryResult<()> = policy
        .execute(
            || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(TallyError::invalid_input("bad snapshot id"))
                }
            },
            None,
        )
        .await;

    match result {
        RetryResult::Failed { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retry_exhausts_attempts() {
    let policy = RetryPolicy::with_config(fast_config(3));
    let result: RetryResult<()> = policy
        .execute(|| async { Err(TallyError::llm("unreachable")) }, None)
        .await;

    match result {
        RetryResult::Failed { attempts, error, .. } => {
            assert_eq!(attempts, 3);
            assert!(matches!(error, TallyError::Llm { .. }));
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_retry_cancelled_before_start() {
    let token = CancellationToken::new();
    token.cancel();
    let policy = RetryPolicy::with_config(fast_config(3));
    let result: RetryResult<()> = policy.execute(|| async { Ok(()) }, Some(token)).await;
    assert!(matches!(result, RetryResult::Cancelled));
}

#[test]
fn test_retry_config_parses_humantime() {
    let config: RetryConfig = toml::from_str(
        r#"
        max_attempts = 4
        initial_delay = "50ms"
        max_delay = "2s"
        "#,
    )
    .unwrap();
    assert_eq!(config.max_attempts, 4);
    assert_eq!(config.initial_delay, Duration::from_millis(50));
    assert_eq!(config.max_delay, Duration::from_secs(2));
    assert_eq!(config.max_duration, Duration::from_secs(300));
}
