//! Adding messages under the allocation guard

use super::ContextManager;
use crate::compression::CompressionStrategy;
use crate::context::CompressionReason;
use crate::error::{TallyError, TallyResult};
use crate::events::ContextEvent;
use crate::guard::GuardAction;
use crate::llm::Message;
use crate::pool::ContextUsage;
use crate::snapshots::SnapshotReason;

impl ContextManager {
    /// Append a message, making room first if it would not fit.
    ///
    /// Room is made by compressing with the tier strategy, then by forced
    /// truncation. A message that still does not fit fails with
    /// [`TallyError::AllocationExceeded`] and is not added.
    pub async fn add_message(&mut self, mut message: Message) -> TallyResult<ContextUsage> {
        if self.take_low_memory() {
            self.handle_low_memory().await?;
        }
        self.sync_pool_resize();

        let tokens = self.counter.count_message(&message);
        message.token_count = Some(tokens);
        self.refresh_usage();

        if !self.guard.can_allocate(tokens) {
            self.make_room(tokens).await?;
        }

        let message_id = message.id.clone();
        let role = message.role;
        let is_user = message.is_user();
        self.context.push(message);
        self.context.recount(&self.counter);

        let usage = self.usage();
        tracing::debug!(
            "Added {} message {} ({} tokens), usage {:.1}%",
            role,
            message_id,
            tokens,
            usage.percentage
        );
        self.events.publish(ContextEvent::MessageAdded {
            message_id,
            role,
            tokens,
            usage,
        });

        self.after_growth(is_user, usage).await;
        Ok(usage)
    }

    async fn make_room(&mut self, tokens: usize) -> TallyResult<()> {
        let reason = match self.guard.check_memory_level_and_act() {
            GuardAction::Emergency(_) => CompressionReason::Emergency,
            GuardAction::Compress | GuardAction::None => CompressionReason::Auto,
        };
        let strategy = self.compression_strategy();
        let _ = self.compress_context(strategy, reason).await;
        if self.guard.can_allocate(tokens) {
            return Ok(());
        }

        if strategy != CompressionStrategy::Truncate {
            tracing::warn!(
                "{} compression left no room for {} tokens, forcing truncation",
                strategy,
                tokens
            );
            let _ = self
                .compress_context(CompressionStrategy::Truncate, CompressionReason::Emergency)
                .await;
            if self.guard.can_allocate(tokens) {
                return Ok(());
            }
        }

        let available = self
            .guard
            .safe_limit()
            .saturating_sub(self.pool.current_tokens());
        tracing::error!(
            "Cannot fit message of {} tokens: {} available after compression",
            tokens,
            available
        );
        Err(TallyError::allocation_exceeded(tokens, available))
    }

    /// Turn and threshold snapshots, plus escalation warnings
    async fn after_growth(&mut self, is_user: bool, usage: ContextUsage) {
        if is_user && self.snapshots.record_user_turn() {
            self.auto_snapshot(SnapshotReason::Periodic).await;
        }
        if self.snapshots.check_threshold(usage.fraction()) {
            self.auto_snapshot(SnapshotReason::Threshold).await;
        }
        if let Some(level) = self.guard.observe_escalation() {
            tracing::warn!(
                "Context usage escalated to {} at {:.1}%",
                level,
                usage.percentage
            );
            self.events.publish(ContextEvent::LowMemoryWarning {
                level,
                percentage: usage.percentage,
            });
        }
    }
}
