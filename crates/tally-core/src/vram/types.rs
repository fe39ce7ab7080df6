//! VRAM data types

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point-in-time accelerator memory reading, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VramInfo {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    /// Whether model weights are already resident
    pub model_loaded: bool,
}

impl VramInfo {
    pub fn new(total: u64, used: u64, model_loaded: bool) -> Self {
        Self {
            total,
            used,
            available: total.saturating_sub(used),
            model_loaded,
        }
    }

    /// Reading for a machine without a usable accelerator
    pub fn cpu_only() -> Self {
        Self::default()
    }

    pub fn is_cpu_only(&self) -> bool {
        self.total == 0
    }

    /// Fraction of total memory still available, 1.0 on CPU-only machines
    pub fn available_fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.available as f64 / self.total as f64
        }
    }
}

/// Monitor settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VramConfig {
    pub enabled: bool,
    /// Polling interval for background monitoring
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Available fraction below which memory counts as low
    pub low_memory_threshold: f64,
}

impl Default for VramConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(5),
            low_memory_threshold: 0.10,
        }
    }
}

impl VramConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_low_memory_threshold(mut self, threshold: f64) -> Self {
        self.low_memory_threshold = threshold;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}
