//! Tier and mode enums

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::compression::CompressionStrategy;

/// Context-size band, smallest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextTier {
    /// 2-4K
    Minimal,
    /// 4-8K
    Basic,
    /// 8-32K
    Standard,
    /// 32-64K
    Extended,
    /// 64K and above
    Maximum,
}

impl ContextTier {
    pub const ALL: [ContextTier; 5] = [
        ContextTier::Minimal,
        ContextTier::Basic,
        ContextTier::Standard,
        ContextTier::Extended,
        ContextTier::Maximum,
    ];

    /// One tier down, saturating at the smallest
    pub fn lower(&self) -> ContextTier {
        match self {
            ContextTier::Minimal | ContextTier::Basic => ContextTier::Minimal,
            ContextTier::Standard => ContextTier::Basic,
            ContextTier::Extended => ContextTier::Standard,
            ContextTier::Maximum => ContextTier::Extended,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ContextTier::Minimal => "2-4K",
            ContextTier::Basic => "4-8K",
            ContextTier::Standard => "8-32K",
            ContextTier::Extended => "32-64K",
            ContextTier::Maximum => "64K+",
        }
    }
}

impl fmt::Display for ContextTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self, self.label())
    }
}

/// How a tier manages history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierStrategy {
    /// Drop old turns outright
    Rollover,
    /// Summarize old turns
    Smart,
    /// Drop the oldest, summarize the middle
    Progressive,
    /// Summaries with explicit goals and decisions
    Structured,
}

impl TierStrategy {
    /// Compression strategy implementing this tier strategy
    pub fn compression_strategy(&self) -> CompressionStrategy {
        match self {
            TierStrategy::Rollover => CompressionStrategy::Truncate,
            TierStrategy::Smart => CompressionStrategy::Summarize,
            TierStrategy::Progressive => CompressionStrategy::Hybrid,
            TierStrategy::Structured => CompressionStrategy::Summarize,
        }
    }
}

impl fmt::Display for TierStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TierStrategy::Rollover => "rollover",
            TierStrategy::Smart => "smart",
            TierStrategy::Progressive => "progressive",
            TierStrategy::Structured => "structured",
        };
        f.write_str(name)
    }
}

/// What the session is being used for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationalMode {
    #[default]
    Developer,
    Planning,
    Assistant,
    Debugger,
}

impl fmt::Display for OperationalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationalMode::Developer => "developer",
            OperationalMode::Planning => "planning",
            OperationalMode::Assistant => "assistant",
            OperationalMode::Debugger => "debugger",
        };
        f.write_str(name)
    }
}

/// Which size drives tier detection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierPolicy {
    /// The size the user selected
    #[default]
    UserSize,
    /// The largest size the hardware supports
    HardwareLocked,
}
