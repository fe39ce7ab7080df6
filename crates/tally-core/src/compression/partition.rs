//! Splitting a message list into kept, recent and older spans

use super::{SUMMARY_MARKER_KEY, TRUNCATED_COUNT_KEY, TRUNCATION_MARKER_KEY};
use crate::llm::{Message, MessageRole};
use crate::tokens::TokenCounter;

/// A message list split for compression. Indices refer to the input slice.
#[derive(Debug, Clone, Default)]
pub struct Partition {
    /// System prompts and user messages, never removed
    pub protected: Vec<usize>,
    /// Earlier summaries produced by compression
    pub prior_summaries: Vec<usize>,
    /// Earlier truncation markers
    pub prior_markers: Vec<usize>,
    /// Newest candidates that fit the recent budget
    pub recent: Vec<usize>,
    /// Candidates older than the recent budget, oldest first
    pub older: Vec<usize>,
    /// Token budget used for the recent span
    pub recent_budget: usize,
    /// Cumulative count carried by prior truncation markers
    pub prior_truncated: usize,
}

impl Partition {
    pub fn has_work(&self) -> bool {
        !self.older.is_empty()
    }
}

pub fn is_summary_message(message: &Message) -> bool {
    message.has_flag(SUMMARY_MARKER_KEY)
}

pub fn is_truncation_marker(message: &Message) -> bool {
    message.has_flag(TRUNCATION_MARKER_KEY)
}

/// Partition messages for compression.
///
/// The recent budget is `max(preserve_recent_tokens, recent_fraction * candidate tokens)`.
/// Only the newest contiguous run of candidates within that budget counts as recent.
pub fn partition_messages(
    messages: &[Message],
    counter: &TokenCounter,
    preserve_recent_tokens: usize,
    recent_fraction: f64,
) -> Partition {
    let mut partition = Partition::default();
    let mut candidates = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        if is_summary_message(message) {
            partition.prior_summaries.push(index);
        } else if is_truncation_marker(message) {
            partition.prior_truncated += message.metadata_u64(TRUNCATED_COUNT_KEY).unwrap_or(0) as usize;
            partition.prior_markers.push(index);
        } else if matches!(message.role, MessageRole::System | MessageRole::User) {
            partition.protected.push(index);
        } else {
            candidates.push(index);
        }
    }

    let candidate_tokens: usize = candidates
        .iter()
        .map(|&i| counter.count_message(&messages[i]))
        .sum();
    let proportional = (candidate_tokens as f64 * recent_fraction.clamp(0.0, 1.0)).ceil() as usize;
    partition.recent_budget = preserve_recent_tokens.max(proportional);

    let mut used = 0;
    let mut split = candidates.len();
    for (position, &index) in candidates.iter().enumerate().rev() {
        let tokens = counter.count_message(&messages[index]);
        if used + tokens > partition.recent_budget {
            break;
        }
        used += tokens;
        split = position;
    }

    partition.older = candidates[..split].to_vec();
    partition.recent = candidates[split..].to_vec();
    partition
}
