//! Snapshot operations bound to the live session

use super::ContextManager;
use crate::error::TallyResult;
use crate::events::ContextEvent;
use crate::snapshots::{ContextSnapshot, SnapshotReason, SnapshotSummary};

impl ContextManager {
    /// Persist the current conversation
    pub async fn create_snapshot(&mut self, reason: SnapshotReason) -> TallyResult<ContextSnapshot> {
        self.context.recount(&self.counter);
        let snapshot = self
            .snapshots
            .create_snapshot(
                &self.context,
                reason,
                self.tier,
                self.mode,
                self.checkpoints.total_compressions(),
            )
            .await?;
        self.context.metadata.last_snapshot_id = Some(snapshot.id.clone());
        Ok(snapshot)
    }

    /// Snapshot without failing the caller. Failures become `auto-snapshot-failed`.
    pub(super) async fn auto_snapshot(&mut self, reason: SnapshotReason) -> Option<String> {
        if !self.snapshots.is_enabled() {
            return None;
        }
        match self.create_snapshot(reason).await {
            Ok(snapshot) => {
                self.events.publish(ContextEvent::AutoSnapshotCreated {
                    snapshot_id: snapshot.id.clone(),
                    reason,
                });
                Some(snapshot.id)
            }
            Err(e) => {
                tracing::warn!("Automatic {} snapshot failed: {}", reason, e);
                self.events.publish(ContextEvent::AutoSnapshotFailed {
                    reason,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Replace the live conversation with a stored snapshot.
    ///
    /// The session keeps its id, window size, tier and mode; the system prompt is
    /// re-rendered for them.
    pub async fn restore_snapshot(&mut self, id: &str) -> TallyResult<()> {
        let snapshot = self.snapshots.load_snapshot(id).await?;

        let mut context = snapshot.to_context();
        context.session_id = self.context.session_id.clone();
        self.context = context;
        self.checkpoints
            .set_total_compressions(snapshot.metadata.compression_count);
        self.pending_compression = false;

        self.rebuild_system_prompt();
        self.apply_hard_limit();
        self.refresh_usage();

        tracing::info!(
            "Restored snapshot {} into session {}: {} messages, {} checkpoints",
            snapshot.id,
            self.session_id(),
            self.context.messages.len(),
            self.context.checkpoints.len()
        );
        Ok(())
    }

    /// Snapshots of this session, newest first
    pub async fn list_snapshots(&self) -> TallyResult<Vec<SnapshotSummary>> {
        self.snapshots.list_snapshots(self.session_id()).await
    }

    pub async fn delete_snapshot(&self, id: &str) -> TallyResult<()> {
        self.snapshots.delete_snapshot(id).await
    }
}
