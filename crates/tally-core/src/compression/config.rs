//! Compression configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// How older messages are reduced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    /// Drop older messages, leave a count marker
    Truncate,
    /// Replace older messages with an LLM summary
    Summarize,
    /// Drop the oldest half of the older span, summarize the rest
    Hybrid,
}

impl fmt::Display for CompressionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressionStrategy::Truncate => "truncate",
            CompressionStrategy::Summarize => "summarize",
            CompressionStrategy::Hybrid => "hybrid",
        };
        f.write_str(name)
    }
}

/// Configuration for the compression service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Force a strategy instead of the one implied by the tier
    pub strategy: Option<CompressionStrategy>,
    /// Minimum tokens of recent non-user messages kept verbatim
    pub preserve_recent_tokens: usize,
    /// Share of candidate tokens kept verbatim when larger than `preserve_recent_tokens`
    pub recent_budget_fraction: f64,
    /// Split point of the older span for hybrid compression
    pub hybrid_split: f64,
    /// Compress automatically after a response once usage passes `threshold`
    pub auto_compress: bool,
    /// Usage fraction that schedules compression
    pub threshold: f64,
    /// Model name passed to the summarization provider
    pub summary_model: String,
    pub summary_max_tokens: usize,
    pub summary_temperature: f32,
    /// Per-call deadline for summarization
    #[serde(with = "humantime_serde")]
    pub summary_timeout: Duration,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            strategy: None,
            preserve_recent_tokens: 2000,
            recent_budget_fraction: 0.30,
            hybrid_split: 0.5,
            auto_compress: true,
            threshold: 0.80,
            summary_model: "default".to_string(),
            summary_max_tokens: 1024,
            summary_temperature: 0.3,
            summary_timeout: Duration::from_secs(120),
        }
    }
}

impl CompressionConfig {
    pub fn with_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn with_preserve_recent_tokens(mut self, tokens: usize) -> Self {
        self.preserve_recent_tokens = tokens;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_summary_model(mut self, model: impl Into<String>) -> Self {
        self.summary_model = model.into();
        self
    }

    pub fn with_summary_timeout(mut self, timeout: Duration) -> Self {
        self.summary_timeout = timeout;
        self
    }

    pub fn with_auto_compress(mut self, enabled: bool) -> Self {
        self.auto_compress = enabled;
        self
    }
}
