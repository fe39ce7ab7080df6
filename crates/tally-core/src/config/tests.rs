//! Tests for configuration loading and validation

use super::*;
use crate::compression::CompressionStrategy;
use crate::error::TallyError;
use crate::guard::GuardConfig;
use crate::pool::{ContextPoolConfig, KvQuantization};
use crate::tiers::{OperationalMode, TierPolicy};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_defaults_are_valid() {
    let config = TallyConfig::default();
    ConfigValidator::validate(&config).unwrap();
    assert_eq!(config.auto_summary_cooldown, Duration::from_secs(60));
    assert_eq!(config.rollover_keep_user_messages, 10);
    assert_eq!(config.pool.target_size, 8192);
    assert_eq!(config.compression.summary_timeout, Duration::from_secs(120));
}

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let config = load_from_file(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config, TallyConfig::default());
}

#[test]
fn test_load_toml_with_partial_sections() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tally.toml");
    fs::write(
        &path,
        r#"
mode = "planning"
tier_policy = "hardware_locked"
auto_summary_cooldown = "90s"

[pool]
target_size = 16384
kv_quantization = "q8_0"

[compression]
strategy = "hybrid"
summary_timeout = "2m"

[snapshots]
turn_interval = 3
"#,
    )
    .unwrap();

    let config = load_from_file(&path).unwrap();
    assert_eq!(config.mode, OperationalMode::Planning);
    assert_eq!(config.tier_policy, TierPolicy::HardwareLocked);
    assert_eq!(config.auto_summary_cooldown, Duration::from_secs(90));
    assert_eq!(config.pool.target_size, 16384);
    assert_eq!(config.pool.min_size, ContextPoolConfig::default().min_size);
    assert_eq!(config.pool.kv_quantization, KvQuantization::Q8);
    assert_eq!(config.compression.strategy, Some(CompressionStrategy::Hybrid));
    assert_eq!(config.compression.summary_timeout, Duration::from_secs(120));
    assert_eq!(config.snapshots.turn_interval, 3);
    assert_eq!(config.snapshots.max_snapshots, 10);
}

#[test]
fn test_load_json_and_yaml() {
    let dir = TempDir::new().unwrap();
    let json_path = dir.path().join("tally.json");
    fs::write(&json_path, r#"{"session_id": "abc", "guard": {"safety_buffer": 128}}"#).unwrap();
    let config = load_from_file(&json_path).unwrap();
    assert_eq!(config.session_id.as_deref(), Some("abc"));
    assert_eq!(config.guard.safety_buffer, 128);
    assert_eq!(config.guard.warning, 0.80);

    let yaml = "mode: debugger\nretry:\n  max_attempts: 5\n";
    let config = load_from_str(yaml, ConfigFormat::Yaml).unwrap();
    assert_eq!(config.mode, OperationalMode::Debugger);
    assert_eq!(config.retry.max_attempts, 5);
}

#[test]
fn test_parse_error_names_the_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("broken.toml");
    fs::write(&path, "pool = [").unwrap();

    let error = load_from_file(&path).unwrap_err();
    assert!(matches!(error, TallyError::Config { .. }));
    assert!(error.context().unwrap_or_default().contains("broken.toml"));
}

#[test]
fn test_rejects_unordered_sizes() {
    let config = TallyConfig::default().with_pool(ContextPoolConfig::default().with_target_size(1024));
    assert!(ConfigValidator::validate(&config).is_err());

    let config = TallyConfig::default().with_pool(ContextPoolConfig::default().with_bounds(9000, 4096));
    assert!(ConfigValidator::validate(&config).is_err());
}

#[test]
fn test_rejects_unordered_guard_thresholds() {
    let config =
        TallyConfig::default().with_guard(GuardConfig::default().with_thresholds(0.9, 0.8, 0.95));
    let error = ConfigValidator::validate(&config).unwrap_err();
    assert!(error.to_string().contains("guard thresholds"));
}

#[test]
fn test_rejects_out_of_range_fractions_and_zero_durations() {
    let mut config = TallyConfig::default();
    config.snapshots.threshold = 1.5;
    assert!(ConfigValidator::validate(&config).is_err());

    let mut config = TallyConfig::default();
    config.vram.poll_interval = Duration::ZERO;
    assert!(ConfigValidator::validate(&config).is_err());

    let mut config = TallyConfig::default();
    config.retry.max_attempts = 0;
    assert!(ConfigValidator::validate(&config).is_err());
}
