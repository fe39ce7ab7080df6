//! Checkpoint types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::llm::Message;

/// Detail kept by a checkpoint. Ordered from least to most detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckpointLevel {
    /// Single-line digest
    Compact,
    /// First lines plus a few key decisions
    Moderate,
    /// The full summary
    Detailed,
}

impl fmt::Display for CheckpointLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CheckpointLevel::Compact => "COMPACT",
            CheckpointLevel::Moderate => "MODERATE",
            CheckpointLevel::Detailed => "DETAILED",
        };
        f.write_str(name)
    }
}

/// Span of conversation a checkpoint stands for
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MessageRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub message_count: usize,
}

impl MessageRange {
    /// Range covering `messages`, or an empty range at `now`
    pub fn covering(messages: &[Message]) -> Self {
        let now = Utc::now();
        let start = messages.iter().map(|m| m.timestamp).min().unwrap_or(now);
        let end = messages.iter().map(|m| m.timestamp).max().unwrap_or(now);
        Self {
            start,
            end,
            message_count: messages.len(),
        }
    }

    pub fn merge(&self, other: &MessageRange) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            message_count: self.message_count + other.message_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressionCheckpoint {
    pub id: String,
    pub level: CheckpointLevel,
    pub range: MessageRange,
    pub summary: Message,
    pub created_at: DateTime<Utc>,
    /// Session compression count when this checkpoint was created; fixes its age
    pub compression_number: u64,
    pub original_tokens: usize,
    pub current_tokens: usize,
    /// Compressions folded into this checkpoint, more than one after a merge
    pub compression_count: u32,
    pub key_decisions: Vec<String>,
    pub files_modified: Vec<String>,
}

impl CompressionCheckpoint {
    /// Compressions since this checkpoint was created
    pub fn age(&self, total_compressions: u64) -> u64 {
        total_compressions.saturating_sub(self.compression_number)
    }
}

/// Demotion policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgingConfig {
    /// Age at which DETAILED becomes MODERATE
    pub moderate_after: u64,
    /// Age at which any level becomes COMPACT
    pub compact_after: u64,
    /// Summary lines kept at MODERATE
    pub moderate_lines: usize,
    /// Key decisions kept at MODERATE
    pub max_key_decisions: usize,
    /// Length cap of a COMPACT digest
    pub compact_max_chars: usize,
    /// Digest lines a COMPACT merged checkpoint lists; older ones are only counted
    pub merged_digest_entries: usize,
}

impl Default for AgingConfig {
    fn default() -> Self {
        Self {
            moderate_after: 3,
            compact_after: 6,
            moderate_lines: 5,
            max_key_decisions: 3,
            compact_max_chars: 200,
            merged_digest_entries: 4,
        }
    }
}
