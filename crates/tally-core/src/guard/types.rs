//! Guard levels and configuration

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of context usage, ordered from least to most severe
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLevel {
    #[default]
    Normal,
    Warning,
    Critical,
    Emergency,
}

impl fmt::Display for MemoryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryLevel::Normal => "normal",
            MemoryLevel::Warning => "warning",
            MemoryLevel::Critical => "critical",
            MemoryLevel::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

/// Usage fractions at which each level starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// WARNING at or above this fraction
    pub warning: f64,
    /// CRITICAL at or above this fraction
    pub critical: f64,
    /// EMERGENCY strictly above this fraction
    pub emergency: f64,
    /// Tokens held back from the window when checking allocations
    pub safety_buffer: usize,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            warning: 0.80,
            critical: 0.90,
            emergency: 0.95,
            safety_buffer: 256,
        }
    }
}

impl GuardConfig {
    pub fn with_thresholds(mut self, warning: f64, critical: f64, emergency: f64) -> Self {
        self.warning = warning;
        self.critical = critical;
        self.emergency = emergency;
        self
    }

    pub fn with_safety_buffer(mut self, tokens: usize) -> Self {
        self.safety_buffer = tokens;
        self
    }

    /// Level for a usage fraction
    pub fn level_for(&self, fraction: f64) -> MemoryLevel {
        if fraction > self.emergency {
            MemoryLevel::Emergency
        } else if fraction >= self.critical {
            MemoryLevel::Critical
        } else if fraction >= self.warning {
            MemoryLevel::Warning
        } else {
            MemoryLevel::Normal
        }
    }
}

/// What the caller should do about the current level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardAction {
    None,
    /// Run normal compression
    Compress,
    /// Run emergency handling for the given level
    Emergency(MemoryLevel),
}
