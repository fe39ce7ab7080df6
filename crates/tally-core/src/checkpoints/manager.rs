//! Checkpoint recording, aging and merging

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::types::{AgingConfig, CheckpointLevel, CompressionCheckpoint, MessageRange};
use crate::compression::{
    SUMMARY_HEADER, extract_file_paths, extract_key_decisions, strip_summary_header, truncate_chars,
};
use crate::llm::Message;
use crate::tokens::TokenCounter;

/// Leads the body of a COMPACT merged checkpoint
const MERGED_DIGEST_PREFIX: &str = "Merged ";

/// Checkpoints demoted by one aging pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgingReport {
    pub to_moderate: Vec<String>,
    pub to_compact: Vec<String>,
}

impl AgingReport {
    pub fn is_empty(&self) -> bool {
        self.to_moderate.is_empty() && self.to_compact.is_empty()
    }
}

/// Applies the checkpoint policy to a checkpoint list it does not own.
///
/// The list lives in the conversation context; the manager keeps only the session
/// compression count that drives aging.
pub struct CheckpointManager {
    config: AgingConfig,
    counter: Arc<TokenCounter>,
    total_compressions: u64,
}

impl CheckpointManager {
    pub fn new(config: AgingConfig, counter: Arc<TokenCounter>) -> Self {
        Self {
            config,
            counter,
            total_compressions: 0,
        }
    }

    pub fn config(&self) -> &AgingConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: AgingConfig) {
        self.config = config;
    }

    pub fn total_compressions(&self) -> u64 {
        self.total_compressions
    }

    /// Restore the counter, e.g. after loading a snapshot
    pub fn set_total_compressions(&mut self, total: u64) {
        self.total_compressions = total;
    }

    /// Record a compression as a new DETAILED checkpoint, then age and cap the list.
    ///
    /// Returns the id of the new checkpoint, or of the merged checkpoint that
    /// absorbed it when `max_checkpoints` is 1.
    pub fn record(
        &mut self,
        checkpoints: &mut Vec<CompressionCheckpoint>,
        summary: Message,
        removed: &[Message],
        original_tokens: usize,
        max_checkpoints: usize,
    ) -> String {
        self.total_compressions += 1;

        let current_tokens = self.counter.count_message(&summary);
        let checkpoint = CompressionCheckpoint {
            id: Uuid::new_v4().to_string(),
            level: CheckpointLevel::Detailed,
            range: MessageRange::covering(removed),
            key_decisions: extract_key_decisions(removed),
            files_modified: extract_file_paths(removed),
            summary,
            created_at: Utc::now(),
            compression_number: self.total_compressions,
            original_tokens,
            current_tokens,
            compression_count: 1,
        };
        let id = checkpoint.id.clone();
        tracing::debug!(
            "Recorded checkpoint {} (compression #{}, {} -> {} tokens)",
            id,
            self.total_compressions,
            original_tokens,
            current_tokens
        );
        checkpoints.push(checkpoint);

        self.apply_aging(checkpoints);
        self.enforce_limit(checkpoints, max_checkpoints);

        if checkpoints.iter().any(|c| c.id == id) {
            id
        } else {
            checkpoints.last().map(|c| c.id.clone()).unwrap_or(id)
        }
    }

    /// Demote checkpoints by age. Levels only ever lose detail.
    pub fn apply_aging(&self, checkpoints: &mut [CompressionCheckpoint]) -> AgingReport {
        let mut report = AgingReport::default();

        for checkpoint in checkpoints.iter_mut() {
            let age = checkpoint.age(self.total_compressions);
            if age >= self.config.compact_after && checkpoint.level > CheckpointLevel::Compact {
                let digest = self.compact_digest(checkpoint);
                self.demote(checkpoint, CheckpointLevel::Compact, digest);
                report.to_compact.push(checkpoint.id.clone());
            } else if age >= self.config.moderate_after
                && checkpoint.level == CheckpointLevel::Detailed
            {
                let text = self.moderate_text(checkpoint);
                self.demote(checkpoint, CheckpointLevel::Moderate, text);
                report.to_moderate.push(checkpoint.id.clone());
            }
        }

        if !report.is_empty() {
            tracing::debug!(
                "Aged checkpoints: {} to moderate, {} to compact",
                report.to_moderate.len(),
                report.to_compact.len()
            );
        }
        report
    }

    /// Merge the oldest checkpoints so at most `max_checkpoints` remain
    pub fn enforce_limit(&self, checkpoints: &mut Vec<CompressionCheckpoint>, max_checkpoints: usize) {
        let max_checkpoints = max_checkpoints.max(1);
        if checkpoints.len() <= max_checkpoints {
            return;
        }

        let excess = checkpoints.len() - max_checkpoints + 1;
        let merged: Vec<CompressionCheckpoint> = checkpoints.drain(..excess).collect();
        let synthetic = self.merge(merged);
        tracing::debug!(
            "Merged {} checkpoints into {} ({} compressions)",
            excess,
            synthetic.id,
            synthetic.compression_count
        );
        checkpoints.insert(0, synthetic);
    }

    /// Tokens of every checkpoint summary
    pub fn checkpoint_tokens(&self, checkpoints: &[CompressionCheckpoint]) -> usize {
        checkpoints
            .iter()
            .map(|c| self.counter.count_message(&c.summary))
            .sum()
    }

    fn merge(&self, merged: Vec<CompressionCheckpoint>) -> CompressionCheckpoint {
        let level = merged
            .iter()
            .map(|c| c.level)
            .min()
            .unwrap_or(CheckpointLevel::Compact);
        let compression_number = merged
            .iter()
            .map(|c| c.compression_number)
            .min()
            .unwrap_or(self.total_compressions);

        let mut range: Option<MessageRange> = None;
        let mut key_decisions: Vec<String> = Vec::new();
        let mut files_modified: Vec<String> = Vec::new();
        let mut original_tokens = 0;
        let mut compression_count = 0;

        for checkpoint in &merged {
            range = Some(match range {
                Some(r) => r.merge(&checkpoint.range),
                None => checkpoint.range,
            });
            union_into(&mut key_decisions, &checkpoint.key_decisions);
            union_into(&mut files_modified, &checkpoint.files_modified);
            original_tokens += checkpoint.original_tokens;
            compression_count += checkpoint.compression_count;
        }

        let body = if level == CheckpointLevel::Compact {
            self.merged_digest(&merged, compression_count, original_tokens)
        } else {
            merged
                .iter()
                .map(|c| strip_summary_header(&c.summary.content))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        let summary = merged
            .first()
            .map(|c| c.summary.clone())
            .unwrap_or_else(|| Message::system(""));
        let mut summary = Message {
            id: Uuid::new_v4().to_string(),
            content: format!("{}\n{}", SUMMARY_HEADER, body),
            timestamp: Utc::now(),
            token_count: None,
            ..summary
        };
        let current_tokens = self.counter.count_message(&summary);
        summary.token_count = Some(current_tokens);

        CompressionCheckpoint {
            id: Uuid::new_v4().to_string(),
            level,
            range: range.unwrap_or_else(|| MessageRange::covering(&[])),
            summary,
            created_at: Utc::now(),
            compression_number,
            original_tokens,
            current_tokens,
            compression_count,
            key_decisions,
            files_modified,
        }
    }

    /// One line per folded compression, newest `merged_digest_entries` kept.
    ///
    /// A previous merge's lead line is dropped and its entries re-listed, so the
    /// body stays bounded however many times the oldest slot is merged again.
    fn merged_digest(
        &self,
        merged: &[CompressionCheckpoint],
        compression_count: u32,
        original_tokens: usize,
    ) -> String {
        let mut entries: Vec<String> = Vec::new();
        for checkpoint in merged {
            if checkpoint.level == CheckpointLevel::Compact {
                entries.extend(
                    summary_lines(&checkpoint.summary.content)
                        .filter(|line| !line.starts_with(MERGED_DIGEST_PREFIX))
                        .map(|line| line.trim_start_matches(['-', ' ']).to_string()),
                );
            } else {
                entries.push(self.compact_digest(checkpoint));
            }
        }

        let keep = self.config.merged_digest_entries.max(1);
        let skip = entries.len().saturating_sub(keep);
        let unlisted = (compression_count as usize).saturating_sub(entries.len() - skip);
        let mut lines = vec![format!(
            "{}{} compressions ({} tokens); {} earlier not listed",
            MERGED_DIGEST_PREFIX, compression_count, original_tokens, unlisted
        )];
        lines.extend(entries.into_iter().skip(skip).map(|entry| format!("- {}", entry)));
        lines.join("\n")
    }

    fn demote(&self, checkpoint: &mut CompressionCheckpoint, level: CheckpointLevel, body: String) {
        checkpoint.level = level;
        checkpoint.summary.content = format!("{}\n{}", SUMMARY_HEADER, body);
        checkpoint.summary.token_count = None;
        checkpoint.current_tokens = self.counter.count_message(&checkpoint.summary);
    }

    fn moderate_text(&self, checkpoint: &CompressionCheckpoint) -> String {
        let mut lines: Vec<String> = summary_lines(&checkpoint.summary.content)
            .take(self.config.moderate_lines)
            .map(str::to_string)
            .collect();
        let decisions: Vec<&String> = checkpoint
            .key_decisions
            .iter()
            .take(self.config.max_key_decisions)
            .collect();
        if !decisions.is_empty() {
            lines.push("Key decisions:".to_string());
            lines.extend(decisions.into_iter().map(|d| format!("- {}", d)));
        }
        lines.join("\n")
    }

    fn compact_digest(&self, checkpoint: &CompressionCheckpoint) -> String {
        let first = summary_lines(&checkpoint.summary.content)
            .find(|line| !line.starts_with('#') && !line.eq_ignore_ascii_case("Key decisions:"))
            .unwrap_or("");
        let digest = format!(
            "{} messages ({} tokens): {}",
            checkpoint.range.message_count,
            checkpoint.original_tokens,
            first.trim_start_matches(['-', '*', ' '])
        );
        truncate_chars(&digest, self.config.compact_max_chars)
    }
}

fn summary_lines(content: &str) -> impl Iterator<Item = &str> {
    strip_summary_header(content)
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
}

fn union_into(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
