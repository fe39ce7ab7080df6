//! Compression service

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::config::{CompressionConfig, CompressionStrategy};
use super::partition::{Partition, partition_messages};
use super::summary::{
    SUMMARY_HEADER, build_summary_prompt, extract_summary, placeholder_summary,
    strip_summary_header,
};
use super::types::{CompressionEstimate, CompressionResult, CompressionStatus};
use super::{COMPRESSED_COUNT_KEY, SUMMARY_MARKER_KEY, TRUNCATED_COUNT_KEY, TRUNCATION_MARKER_KEY};
use crate::error::TallyError;
use crate::llm::{ChatProvider, ChatRequest, Message, collect_text};
use crate::recovery::{RetryConfig, RetryPolicy, RetryResult};
use crate::tokens::TokenCounter;

/// Reduces message lists by truncation, summarization or both.
///
/// The service holds no conversation state. Without a provider every
/// summarization uses the placeholder text.
pub struct CompressionService {
    config: CompressionConfig,
    counter: Arc<TokenCounter>,
    provider: Option<Arc<dyn ChatProvider>>,
    retry: RetryConfig,
}

/// Text produced for a summarized span
struct SpanSummary {
    text: String,
    used_fallback: bool,
}

impl CompressionService {
    pub fn new(config: CompressionConfig, counter: Arc<TokenCounter>) -> Self {
        Self {
            config,
            counter,
            provider: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn ChatProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: CompressionConfig) {
        self.config = config;
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Whether usage has reached the compression threshold
    pub fn should_compress(&self, token_count: usize, threshold: usize) -> bool {
        threshold > 0 && token_count >= threshold
    }

    /// Compress `messages` with `strategy`
    pub async fn compress(&self, messages: &[Message], strategy: CompressionStrategy) -> CompressionResult {
        self.compress_with_cancel(messages, strategy, CancellationToken::new())
            .await
    }

    /// Compress with a token that aborts summarization.
    ///
    /// A cancelled summarization falls back to the placeholder text, so the pass
    /// still completes.
    pub async fn compress_with_cancel(
        &self,
        messages: &[Message],
        strategy: CompressionStrategy,
        cancel: CancellationToken,
    ) -> CompressionResult {
        let original_tokens = self.counter.count_conversation_tokens(messages);
        let partition = partition_messages(
            messages,
            &self.counter,
            self.config.preserve_recent_tokens,
            self.config.recent_budget_fraction,
        );

        tracing::debug!(
            "Compressing {} messages ({} tokens) with {}: {} older, {} recent, budget {}",
            messages.len(),
            original_tokens,
            strategy,
            partition.older.len(),
            partition.recent.len(),
            partition.recent_budget
        );

        if !partition.has_work() {
            return self.finish(Outcome::unchanged(strategy), messages, original_tokens);
        }

        let outcome = match strategy {
            CompressionStrategy::Truncate => self.truncate(&partition),
            CompressionStrategy::Summarize => self.summarize(messages, &partition, &cancel).await,
            CompressionStrategy::Hybrid => self.hybrid(messages, &partition, &cancel).await,
        };

        let result = self.finish(outcome, messages, original_tokens);
        if result.is_inflated() {
            tracing::debug!(
                "Compression with {} did not reduce tokens ({} -> {})",
                strategy,
                result.original_tokens,
                result.compressed_tokens
            );
        } else {
            tracing::info!(
                "Compressed {} -> {} tokens with {} ({} summarized, {} truncated)",
                result.original_tokens,
                result.compressed_tokens,
                strategy,
                result.messages_compressed,
                result.truncated_count
            );
        }
        result
    }

    /// Predict a pass without doing it: removed messages shrink by about half
    pub fn estimate_compression(&self, messages: &[Message]) -> CompressionEstimate {
        let original_tokens = self.counter.count_conversation_tokens(messages);
        let partition = partition_messages(
            messages,
            &self.counter,
            self.config.preserve_recent_tokens,
            self.config.recent_budget_fraction,
        );
        let older_tokens: usize = partition
            .older
            .iter()
            .map(|&i| self.counter.count_message(&messages[i]))
            .sum();
        let estimated_tokens = original_tokens - older_tokens / 2;

        CompressionEstimate {
            original_tokens,
            estimated_tokens,
            estimated_ratio: ratio(estimated_tokens, original_tokens),
            compressible_messages: partition.older.len(),
        }
    }

    fn truncate(&self, partition: &Partition) -> Outcome {
        let truncated = partition.older.len();
        let cumulative = partition.prior_truncated + truncated;

        let marker = Message::system(format!(
            "[{} earlier messages truncated to fit the context window]",
            cumulative
        ))
        .with_metadata(TRUNCATION_MARKER_KEY, true)
        .with_metadata(TRUNCATED_COUNT_KEY, cumulative as u64);

        let mut removed: HashSet<usize> = partition.older.iter().copied().collect();
        removed.extend(partition.prior_markers.iter().copied());

        Outcome {
            strategy: CompressionStrategy::Truncate,
            removed,
            summary: Some(marker),
            messages_compressed: 0,
            truncated_count: truncated,
            used_fallback: false,
        }
    }

    async fn summarize(
        &self,
        messages: &[Message],
        partition: &Partition,
        cancel: &CancellationToken,
    ) -> Outcome {
        let previous = previous_summary(messages, partition);
        let span = span_messages(messages, &partition.older, &partition.prior_markers);
        let summary = self.summarize_span(&span, previous.as_deref(), cancel).await;

        let compressed = span.len() + prior_compressed(messages, partition);
        let mut removed: HashSet<usize> = partition.older.iter().copied().collect();
        removed.extend(partition.prior_summaries.iter().copied());
        removed.extend(partition.prior_markers.iter().copied());

        Outcome {
            strategy: CompressionStrategy::Summarize,
            removed,
            summary: Some(summary_message(&summary.text, compressed)),
            messages_compressed: partition.older.len(),
            truncated_count: 0,
            used_fallback: summary.used_fallback,
        }
    }

    async fn hybrid(
        &self,
        messages: &[Message],
        partition: &Partition,
        cancel: &CancellationToken,
    ) -> Outcome {
        let split = (partition.older.len() as f64 * self.config.hybrid_split.clamp(0.0, 1.0))
            .floor() as usize;
        let (very_old, middle) = partition.older.split_at(split);

        let previous = previous_summary(messages, partition);
        let span = span_messages(messages, middle, &partition.prior_markers);
        let summary = if span.is_empty() {
            SpanSummary {
                text: previous.clone().unwrap_or_default(),
                used_fallback: false,
            }
        } else {
            self.summarize_span(&span, previous.as_deref(), cancel).await
        };

        let truncated_total = partition.prior_truncated + very_old.len();
        let mut text = summary.text;
        if truncated_total > 0 {
            if !text.is_empty() {
                text.push_str("\n\n");
            }
            text.push_str(&format!("[{} older messages truncated]", truncated_total));
        }

        let compressed = middle.len() + prior_compressed(messages, partition);
        let mut removed: HashSet<usize> = partition.older.iter().copied().collect();
        removed.extend(partition.prior_summaries.iter().copied());
        removed.extend(partition.prior_markers.iter().copied());

        let message = summary_message(&text, compressed)
            .with_metadata(TRUNCATED_COUNT_KEY, truncated_total as u64);

        Outcome {
            strategy: CompressionStrategy::Hybrid,
            removed,
            summary: Some(message),
            messages_compressed: middle.len(),
            truncated_count: very_old.len(),
            used_fallback: summary.used_fallback,
        }
    }

    /// Summarize a span through the provider, retrying transient failures before
    /// settling for the placeholder.
    async fn summarize_span(
        &self,
        span: &[Message],
        previous: Option<&str>,
        cancel: &CancellationToken,
    ) -> SpanSummary {
        let Some(provider) = self.provider.as_ref() else {
            tracing::debug!("No summarization provider, using placeholder");
            return fallback(span.len(), previous);
        };

        let prompt = build_summary_prompt(span, previous);
        let policy = RetryPolicy::with_config(self.retry.clone());
        let result = policy
            .execute(
                || {
                    let provider = provider.clone();
                    let request = ChatRequest::new(self.config.summary_model.clone(), prompt.clone())
                        .with_max_tokens(self.config.summary_max_tokens)
                        .with_temperature(self.config.summary_temperature)
                        .with_timeout(self.config.summary_timeout)
                        .with_cancel(cancel.clone());
                    async move {
                        let response = collect_text(provider.as_ref(), request).await?;
                        let summary = extract_summary(&response);
                        if summary.is_empty() {
                            return Err(TallyError::summarization_failed("empty summary response"));
                        }
                        Ok(summary)
                    }
                },
                Some(cancel.clone()),
            )
            .await;

        match result {
            RetryResult::Success(text) => SpanSummary {
                text,
                used_fallback: false,
            },
            RetryResult::Failed { error, attempts, .. } => {
                tracing::warn!(
                    "Summarization failed after {} attempt(s), using placeholder: {}",
                    attempts,
                    error
                );
                fallback(span.len(), previous)
            }
            RetryResult::Cancelled => {
                tracing::warn!("Summarization cancelled, using placeholder");
                fallback(span.len(), previous)
            }
        }
    }

    fn finish(&self, outcome: Outcome, messages: &[Message], original_tokens: usize) -> CompressionResult {
        let mut preserved = Vec::with_capacity(messages.len());
        let mut removed = Vec::with_capacity(outcome.removed.len());
        for (index, message) in messages.iter().enumerate() {
            if outcome.removed.contains(&index) {
                removed.push(message.clone());
            } else {
                preserved.push(message.clone());
            }
        }

        let summary_tokens = outcome
            .summary
            .as_ref()
            .map(|s| self.counter.count_message(s))
            .unwrap_or(0);
        let compressed_tokens = self.counter.count_conversation_tokens(&preserved) + summary_tokens;
        let status = if compressed_tokens < original_tokens {
            CompressionStatus::Success
        } else {
            CompressionStatus::Inflated
        };

        CompressionResult {
            strategy: outcome.strategy,
            summary: outcome.summary,
            preserved,
            removed,
            original_tokens,
            compressed_tokens,
            compression_ratio: ratio(compressed_tokens, original_tokens),
            status,
            messages_compressed: outcome.messages_compressed,
            truncated_count: outcome.truncated_count,
            used_fallback: outcome.used_fallback,
        }
    }
}

/// What a strategy decided, before token accounting
struct Outcome {
    strategy: CompressionStrategy,
    removed: HashSet<usize>,
    summary: Option<Message>,
    messages_compressed: usize,
    truncated_count: usize,
    used_fallback: bool,
}

impl Outcome {
    fn unchanged(strategy: CompressionStrategy) -> Self {
        Self {
            strategy,
            removed: HashSet::new(),
            summary: None,
            messages_compressed: 0,
            truncated_count: 0,
            used_fallback: false,
        }
    }
}

fn ratio(compressed: usize, original: usize) -> f64 {
    if original == 0 {
        1.0
    } else {
        compressed as f64 / original as f64
    }
}

fn summary_message(text: &str, compressed: usize) -> Message {
    Message::system(format!("{}\n{}", SUMMARY_HEADER, text))
        .with_metadata(SUMMARY_MARKER_KEY, true)
        .with_metadata(COMPRESSED_COUNT_KEY, compressed as u64)
}

fn previous_summary(messages: &[Message], partition: &Partition) -> Option<String> {
    let bodies: Vec<&str> = partition
        .prior_summaries
        .iter()
        .map(|&i| strip_summary_header(&messages[i].content))
        .filter(|body| !body.is_empty())
        .collect();
    (!bodies.is_empty()).then(|| bodies.join("\n\n"))
}

fn prior_compressed(messages: &[Message], partition: &Partition) -> usize {
    partition
        .prior_summaries
        .iter()
        .filter_map(|&i| messages[i].metadata_u64(COMPRESSED_COUNT_KEY))
        .sum::<u64>() as usize
}

/// Messages to summarize in input order, earlier truncation markers included
fn span_messages(messages: &[Message], older: &[usize], markers: &[usize]) -> Vec<Message> {
    let mut indices: Vec<usize> = older.iter().chain(markers).copied().collect();
    indices.sort_unstable();
    indices.into_iter().map(|i| messages[i].clone()).collect()
}

fn fallback(count: usize, previous: Option<&str>) -> SpanSummary {
    let placeholder = placeholder_summary(count);
    let text = match previous {
        Some(previous) => format!("{}\n\n{}", previous, placeholder),
        None => placeholder,
    };
    SpanSummary {
        text,
        used_fallback: true,
    }
}
