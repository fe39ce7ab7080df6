//! Compression result types

use serde::{Deserialize, Serialize};

use super::config::CompressionStrategy;
use crate::llm::Message;

/// Whether a compression actually reduced tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStatus {
    Success,
    /// `compressed_tokens >= original_tokens`; callers should discard the result
    Inflated,
}

/// Output of a compression pass
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub strategy: CompressionStrategy,
    /// Summary or truncation marker standing in for removed messages
    pub summary: Option<Message>,
    /// Surviving input messages in their original order
    pub preserved: Vec<Message>,
    /// Input messages removed by this pass, oldest first
    pub removed: Vec<Message>,
    pub original_tokens: usize,
    /// Tokens of `preserved` plus `summary`
    pub compressed_tokens: usize,
    /// compressed / original
    pub compression_ratio: f64,
    pub status: CompressionStatus,
    /// Messages folded into the summary
    pub messages_compressed: usize,
    /// Messages dropped without summarization
    pub truncated_count: usize,
    /// Summarization failed and the placeholder text was used
    pub used_fallback: bool,
}

impl CompressionResult {
    pub fn is_inflated(&self) -> bool {
        self.status == CompressionStatus::Inflated
    }

    pub fn tokens_saved(&self) -> usize {
        self.original_tokens.saturating_sub(self.compressed_tokens)
    }

    /// Preserved messages with the summary placed after the leading system messages
    pub fn output_messages(&self) -> Vec<Message> {
        let mut output = self.preserved.clone();
        if let Some(summary) = &self.summary {
            let position = output
                .iter()
                .position(|m| !m.is_system())
                .unwrap_or(output.len());
            output.insert(position, summary.clone());
        }
        output
    }
}

/// Cheap prediction of a compression pass
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompressionEstimate {
    pub original_tokens: usize,
    pub estimated_tokens: usize,
    pub estimated_ratio: f64,
    /// Messages a pass would remove
    pub compressible_messages: usize,
}
