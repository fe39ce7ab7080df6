//! Compression driven by the orchestrator

use chrono::Utc;

use super::ContextManager;
use crate::compression::{CompressionResult, CompressionStrategy};
use crate::context::{CompressionReason, CompressionRecord};
use crate::error::{TallyError, TallyResult};
use crate::events::ContextEvent;

impl ContextManager {
    /// Compress now with the current strategy.
    ///
    /// Fails with [`TallyError::CompressionInflated`] when the pass would not save
    /// tokens; the conversation is left untouched in that case.
    pub async fn compress_now(&mut self) -> TallyResult<CompressionRecord> {
        let strategy = self.compression_strategy();
        self.compress_context(strategy, CompressionReason::Manual).await
    }

    /// Compress now with an explicit strategy
    pub async fn compress_with(&mut self, strategy: CompressionStrategy) -> TallyResult<CompressionRecord> {
        self.compress_context(strategy, CompressionReason::Manual).await
    }

    /// Run one compression pass over the live conversation.
    ///
    /// Inflated results are discarded, reported as `compression-skipped` and
    /// returned as [`TallyError::CompressionInflated`].
    /// Summaries become checkpoints; truncation markers stay in the message list.
    pub(super) async fn compress_context(
        &mut self,
        strategy: CompressionStrategy,
        reason: CompressionReason,
    ) -> TallyResult<CompressionRecord> {
        let messages = self.context.messages.clone();
        let result = self
            .compression
            .compress_with_cancel(&messages, strategy, self.shutdown.child_token())
            .await;

        if result.is_inflated() {
            tracing::debug!(
                "Discarding {} compression ({}): {} -> {} tokens",
                strategy,
                reason,
                result.original_tokens,
                result.compressed_tokens
            );
            self.events.publish(ContextEvent::CompressionSkipped {
                reason: format!("{} compression with {} did not reduce tokens", reason, strategy),
                original_tokens: result.original_tokens,
                compressed_tokens: result.compressed_tokens,
            });
            return Err(TallyError::compression_inflated(
                result.original_tokens,
                result.compressed_tokens,
            ));
        }

        let checkpoint_id = self.apply_compression(&result);
        self.context.recount(&self.counter);
        self.pending_compression = false;

        let record = CompressionRecord {
            at: Utc::now(),
            strategy,
            reason,
            original_tokens: result.original_tokens,
            compressed_tokens: result.compressed_tokens,
            messages_removed: result.removed.len(),
            checkpoint_id: checkpoint_id.clone(),
            status: result.status,
        };
        self.context.record_compression(record.clone());
        self.refresh_usage();

        if reason == CompressionReason::Emergency {
            tracing::warn!(
                "Emergency {} compression: {} -> {} tokens, {} messages removed",
                strategy,
                result.original_tokens,
                result.compressed_tokens,
                result.removed.len()
            );
        } else {
            tracing::info!(
                "{} compression ({}): {} -> {} tokens, {} messages removed",
                strategy,
                reason,
                result.original_tokens,
                result.compressed_tokens,
                result.removed.len()
            );
        }

        if let Some(id) = checkpoint_id {
            self.events.publish(ContextEvent::AutoSummaryCreated {
                checkpoint_id: id,
                strategy,
                original_tokens: result.original_tokens,
                compressed_tokens: result.compressed_tokens,
                messages_compressed: result.messages_compressed,
            });
        }
        if result.used_fallback {
            self.events.publish(ContextEvent::AutoSummaryFailed {
                error: format!(
                    "summarization unavailable, placeholder used for {} messages",
                    result.messages_compressed
                ),
            });
        }

        Ok(record)
    }

    /// Swap the compressed messages in. Returns the checkpoint id for summaries.
    fn apply_compression(&mut self, result: &CompressionResult) -> Option<String> {
        let summary = match (&result.summary, result.strategy) {
            (Some(summary), CompressionStrategy::Summarize | CompressionStrategy::Hybrid) => {
                summary.clone()
            }
            _ => {
                self.context.replace_messages(result.output_messages());
                return None;
            }
        };

        let removed_tokens = self.counter.count_conversation_tokens(&result.removed);
        let max_checkpoints = self.max_checkpoints();
        let id = self.checkpoints.record(
            &mut self.context.checkpoints,
            summary,
            &result.removed,
            removed_tokens,
            max_checkpoints,
        );
        self.context.replace_messages(result.preserved.clone());
        Some(id)
    }

    /// Compression scheduled by validation or by usage past the threshold.
    ///
    /// Debounced by the summary cooldown; a skipped run stays pending.
    pub(super) async fn run_deferred_compression(&mut self) -> Option<CompressionRecord> {
        let over_threshold = self.config.compression.auto_compress
            && self.usage().fraction() >= self.config.compression.threshold;
        if !self.pending_compression && !over_threshold {
            return None;
        }

        let Some(_running) = self.cooldown.try_acquire() else {
            self.pending_compression = true;
            return None;
        };

        let strategy = self.compression_strategy();
        let record = self
            .compress_context(strategy, CompressionReason::Deferred)
            .await
            .ok();
        self.pending_compression = false;
        record
    }
}
