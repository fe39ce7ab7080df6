//! Tests for error types

use super::*;

#[test]
fn test_allocation_exceeded_display() {
    let err = TallyError::allocation_exceeded(9000, 8192);
    assert_eq!(
        err.to_string(),
        "Allocation exceeded: requested 9000 tokens, 8192 available"
    );
    assert_eq!(err.error_code(), "TALLY_ALLOCATION_EXCEEDED");
}

#[test]
fn test_retry_classification() {
    assert!(TallyError::llm("connection refused").is_retryable());
    assert!(TallyError::timeout(120).is_retryable());
    assert!(TallyError::storage("disk full").is_retryable());
    assert!(TallyError::summarization_failed("empty response").is_retryable());

    assert!(!TallyError::allocation_exceeded(1, 0).is_retryable());
    assert!(!TallyError::emergency_action_failed("rollover", "boom").is_retryable());
    assert!(!TallyError::Cancelled.is_retryable());
    assert!(!TallyError::config("bad").is_retryable());
}

#[test]
fn test_with_context() {
    let err = TallyError::storage("write failed").with_context("saving snapshot abc");
    assert_eq!(err.context(), Some("saving snapshot abc"));

    let cancelled = TallyError::Cancelled.with_context("ignored");
    assert_eq!(cancelled.context(), None);
}

#[test]
fn test_result_ext_context() {
    let result: Result<(), std::fmt::Error> = Err(std::fmt::Error);
    let err = result.context("formatting summary").unwrap_err();
    assert!(err.to_string().contains("formatting summary"));
}

#[test]
fn test_result_ext_lazy_context() {
    let ok: Result<u32, std::fmt::Error> = Ok(7);
    assert_eq!(ok.with_context(|| "unused").unwrap(), 7);

    let failed: Result<u32, String> = Err("disk gone".to_string());
    let err = failed.with_context(|| format!("reading {}", "snap-1")).unwrap_err();
    assert_eq!(err.to_string(), TallyError::other("reading snap-1: disk gone").to_string());
}

#[test]
fn test_option_ext_context() {
    let missing: Option<u32> = None;
    let err = missing.context("snapshot xyz").unwrap_err();
    assert!(matches!(err, TallyError::NotFound { .. }));
}

#[test]
fn test_io_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    let err: TallyError = io.into();
    assert!(matches!(err, TallyError::Io { .. }));
}
