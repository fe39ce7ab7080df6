//! Pre-send validation and emergency actions

use chrono::Utc;

use super::ContextManager;
use super::types::{EmergencyAction, PromptValidation};
use crate::compression::{CompressionStatus, CompressionStrategy};
use crate::context::{CompressionReason, CompressionRecord, ROLLOVER_MARKER_KEY};
use crate::error::TallyError;
use crate::events::ContextEvent;
use crate::llm::Message;
use crate::snapshots::SnapshotReason;

impl ContextManager {
    /// Check the prospective prompt against the hard limit before sending it.
    ///
    /// | usage      | action                                            |
    /// |------------|---------------------------------------------------|
    /// | < 80%      | none                                              |
    /// | 80% - 95%  | warning, compression runs after the response      |
    /// | 95% - 100% | emergency compression, invalid if still >= 95%    |
    /// | > 100%     | snapshot and rollover, invalid if still over 100% |
    ///
    /// Callers must not send the prompt when `valid` is false.
    pub async fn validate_and_build_prompt(&mut self, candidate: Option<&Message>) -> PromptValidation {
        if self.take_low_memory() {
            if let Err(e) = self.handle_low_memory().await {
                tracing::warn!("Low-memory handling failed: {}", e);
            }
        }
        self.sync_pool_resize();

        let initial = self.prompt_validation(candidate, EmergencyAction::None);
        let thresholds = self.guard.config();
        let fraction = initial.fraction();

        if fraction > 1.0 {
            return self.emergency_rollover(candidate, initial).await;
        }
        if fraction >= thresholds.emergency {
            return self.emergency_compression(candidate, initial).await;
        }

        let mut result = initial;
        if fraction >= thresholds.warning {
            self.pending_compression = true;
            let note = format!(
                "Context at {:.1}% ({}), compression scheduled after the response",
                result.percentage,
                thresholds.level_for(fraction)
            );
            tracing::info!("{}", note);
            result.warning = Some(note);
        }
        result
    }

    async fn emergency_compression(
        &mut self,
        candidate: Option<&Message>,
        before: PromptValidation,
    ) -> PromptValidation {
        let limit = self.guard.config().emergency;
        tracing::warn!(
            "Context at {:.1}% of {} tokens: emergency compression",
            before.percentage,
            before.max_tokens
        );

        let strategy = self.compression_strategy();
        let _ = self
            .compress_context(strategy, CompressionReason::Emergency)
            .await;
        let mut result = self.prompt_validation(candidate, EmergencyAction::Compression);

        if result.fraction() >= limit && strategy != CompressionStrategy::Truncate {
            tracing::warn!(
                "Still at {:.1}% after {} compression, truncating",
                result.percentage,
                strategy
            );
            let _ = self
                .compress_context(CompressionStrategy::Truncate, CompressionReason::Emergency)
                .await;
            result = self.prompt_validation(candidate, EmergencyAction::Compression);
        }

        self.events.publish(ContextEvent::EmergencyCompression {
            percentage: before.percentage,
            tokens_before: before.total_tokens,
            tokens_after: result.total_tokens,
        });

        if result.fraction() >= limit {
            let error = TallyError::emergency_action_failed(
                "compression",
                format!("usage still at {:.1}% after compression", result.percentage),
            );
            tracing::error!("{}", error);
            result.valid = false;
            result.warning = Some(error.to_string());
        } else {
            result.warning = Some(format!(
                "Emergency compression at {:.1}%: {} -> {} tokens",
                before.percentage, before.total_tokens, result.total_tokens
            ));
        }
        result
    }

    /// Snapshot, then reset to the system prompt, a rollover marker and the most
    /// recent user messages. Checkpoints are cleared.
    async fn emergency_rollover(
        &mut self,
        candidate: Option<&Message>,
        before: PromptValidation,
    ) -> PromptValidation {
        tracing::warn!(
            "Context at {:.1}% of {} tokens: emergency rollover",
            before.percentage,
            before.max_tokens
        );

        self.snapshots.notify_before_overflow();
        let snapshot_id = self.auto_snapshot(SnapshotReason::Rollover).await;

        let original_tokens = self.prompt_tokens();
        let keep = self.config.rollover_keep_user_messages;
        let users: Vec<Message> = self.context.user_messages().cloned().collect();
        let kept = users[users.len().saturating_sub(keep)..].to_vec();
        let archived = self.context.conversation().count();

        let marker = Message::system(rollover_text(
            archived,
            self.context.checkpoints.len(),
            snapshot_id.as_deref(),
        ))
        .with_metadata(ROLLOVER_MARKER_KEY, true);

        let mut messages = Vec::with_capacity(kept.len() + 2);
        if let Some(system) = self.context.system_message() {
            messages.push(system.clone());
        }
        messages.push(marker);
        messages.extend(kept.iter().cloned());

        self.context.replace_messages(messages);
        self.context.checkpoints.clear();
        self.context.metadata.rollover_count += 1;
        self.context.recount(&self.counter);
        self.pending_compression = false;

        let compressed_tokens = self.prompt_tokens();
        self.context.record_compression(CompressionRecord {
            at: Utc::now(),
            strategy: CompressionStrategy::Truncate,
            reason: CompressionReason::Emergency,
            original_tokens,
            compressed_tokens,
            messages_removed: archived.saturating_sub(kept.len()),
            checkpoint_id: None,
            status: if compressed_tokens < original_tokens {
                CompressionStatus::Success
            } else {
                CompressionStatus::Inflated
            },
        });
        self.refresh_usage();

        self.events.publish(ContextEvent::EmergencyRollover {
            percentage: before.percentage,
            snapshot_id: snapshot_id.clone(),
            messages_kept: kept.len(),
        });

        let mut result = self.prompt_validation(candidate, EmergencyAction::Rollover);
        result.snapshot_id = snapshot_id;
        if result.fraction() > 1.0 {
            let error = TallyError::emergency_action_failed(
                "rollover",
                format!("usage still at {:.1}% after rollover", result.percentage),
            );
            tracing::error!("{}", error);
            result.valid = false;
            result.warning = Some(error.to_string());
        } else {
            let note = format!(
                "Emergency rollover at {:.1}%: {} messages archived, {} user messages kept",
                before.percentage,
                archived,
                kept.len()
            );
            tracing::warn!("{}", note);
            result.warning = Some(note);
        }
        result
    }

    fn prompt_validation(&self, candidate: Option<&Message>, action: EmergencyAction) -> PromptValidation {
        let messages = self.build_prompt(candidate);
        let total_tokens = self.counter.count_conversation_tokens(&messages);
        let max_tokens = self.hard_limit();
        let percentage = if max_tokens == 0 {
            100.0
        } else {
            total_tokens as f64 / max_tokens as f64 * 100.0
        };
        PromptValidation {
            valid: true,
            messages,
            total_tokens,
            max_tokens,
            percentage,
            emergency_action: action,
            warning: None,
            snapshot_id: None,
        }
    }
}

fn rollover_text(archived: usize, checkpoints: usize, snapshot_id: Option<&str>) -> String {
    let mut text = format!(
        "[Context rollover: {} earlier messages and {} checkpoints were archived",
        archived, checkpoints
    );
    if let Some(id) = snapshot_id {
        text.push_str(&format!(" in snapshot {}", id));
    }
    text.push_str(". Only the most recent user messages follow.]");
    text
}
