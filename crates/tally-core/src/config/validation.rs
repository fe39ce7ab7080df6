//! Configuration validation

use std::time::Duration;

use super::model::TallyConfig;
use crate::error::{TallyError, TallyResult};

/// Rejects configurations the engine cannot run with
pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &TallyConfig) -> TallyResult<()> {
        Self::validate_pool(config)?;
        Self::validate_guard(config)?;
        Self::validate_fractions(config)?;
        Self::validate_durations(config)?;
        Self::validate_limits(config)?;
        Ok(())
    }

    fn validate_pool(config: &TallyConfig) -> TallyResult<()> {
        let pool = &config.pool;
        if pool.min_size == 0 {
            return Err(invalid("pool.min_size must be greater than zero"));
        }
        if pool.min_size > pool.max_size {
            return Err(invalid(format!(
                "pool.min_size ({}) exceeds pool.max_size ({})",
                pool.min_size, pool.max_size
            )));
        }
        if pool.target_size < pool.min_size || pool.target_size > pool.max_size {
            return Err(invalid(format!(
                "pool.target_size ({}) must lie within [{}, {}]",
                pool.target_size, pool.min_size, pool.max_size
            )));
        }
        Ok(())
    }

    fn validate_guard(config: &TallyConfig) -> TallyResult<()> {
        let guard = &config.guard;
        let ordered = 0.0 < guard.warning
            && guard.warning < guard.critical
            && guard.critical < guard.emergency
            && guard.emergency <= 1.0;
        if !ordered {
            return Err(invalid(format!(
                "guard thresholds must satisfy 0 < warning < critical < emergency <= 1, got {} / {} / {}",
                guard.warning, guard.critical, guard.emergency
            )));
        }
        Ok(())
    }

    fn validate_fractions(config: &TallyConfig) -> TallyResult<()> {
        let fractions = [
            ("compression.threshold", config.compression.threshold),
            ("compression.recent_budget_fraction", config.compression.recent_budget_fraction),
            ("snapshots.threshold", config.snapshots.threshold),
            ("vram.low_memory_threshold", config.vram.low_memory_threshold),
        ];
        for (name, value) in fractions {
            if !(value > 0.0 && value <= 1.0) {
                return Err(invalid(format!("{} must be in (0, 1], got {}", name, value)));
            }
        }
        if !(0.0..=1.0).contains(&config.compression.hybrid_split) {
            return Err(invalid(format!(
                "compression.hybrid_split must be in [0, 1], got {}",
                config.compression.hybrid_split
            )));
        }
        Ok(())
    }

    fn validate_durations(config: &TallyConfig) -> TallyResult<()> {
        let durations = [
            ("vram.poll_interval", config.vram.poll_interval),
            ("compression.summary_timeout", config.compression.summary_timeout),
            ("retry.max_duration", config.retry.max_duration),
        ];
        for (name, value) in durations {
            if value == Duration::ZERO {
                return Err(invalid(format!("{} must be greater than zero", name)));
            }
        }
        Ok(())
    }

    fn validate_limits(config: &TallyConfig) -> TallyResult<()> {
        if config.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be at least 1"));
        }
        if config.checkpoints.moderate_after > config.checkpoints.compact_after {
            return Err(invalid(format!(
                "checkpoints.moderate_after ({}) exceeds checkpoints.compact_after ({})",
                config.checkpoints.moderate_after, config.checkpoints.compact_after
            )));
        }
        if config.rollover_keep_user_messages == 0 {
            return Err(invalid("rollover_keep_user_messages must be at least 1"));
        }
        if config.event_capacity == 0 {
            return Err(invalid("event_capacity must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> TallyError {
    TallyError::config(message)
}
