//! Snapshot triggers, creation, restore and retention

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::storage::SnapshotStorage;
use super::types::{ContextSnapshot, SnapshotConfig, SnapshotReason, SnapshotSummary};
use crate::context::ConversationContext;
use crate::error::{TallyError, TallyResult};
use crate::recovery::{RetryConfig, RetryPolicy};
use crate::tiers::{ContextTier, OperationalMode};

/// Fired with the usage fraction when a registered threshold is crossed
pub type ThresholdCallback = Arc<dyn Fn(f64) + Send + Sync>;
/// Fired right before the window would overflow
pub type OverflowCallback = Arc<dyn Fn() + Send + Sync>;

struct ThresholdWatch {
    fraction: f64,
    callback: ThresholdCallback,
    armed: bool,
}

/// Decides when to snapshot and talks to the storage backend
pub struct SnapshotManager {
    config: RwLock<SnapshotConfig>,
    storage: Arc<dyn SnapshotStorage>,
    retry: RetryConfig,
    watches: Mutex<Vec<ThresholdWatch>>,
    overflow_callbacks: RwLock<Vec<OverflowCallback>>,
    threshold_armed: AtomicBool,
    user_turns: AtomicU64,
}

impl SnapshotManager {
    pub fn new(config: SnapshotConfig, storage: Arc<dyn SnapshotStorage>) -> Self {
        Self {
            config: RwLock::new(config),
            storage,
            retry: RetryConfig::default(),
            watches: Mutex::new(Vec::new()),
            overflow_callbacks: RwLock::new(Vec::new()),
            threshold_armed: AtomicBool::new(true),
            user_turns: AtomicU64::new(0),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> SnapshotConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, config: SnapshotConfig) {
        *self.config.write() = config;
    }

    pub fn storage(&self) -> &Arc<dyn SnapshotStorage> {
        &self.storage
    }

    pub fn is_enabled(&self) -> bool {
        self.config.read().enabled
    }

    /// Capture and persist `context`, then prune the session to the retention limit.
    ///
    /// Writes are retried with backoff. Pruning failures are logged only.
    pub async fn create_snapshot(
        &self,
        context: &ConversationContext,
        reason: SnapshotReason,
        tier: ContextTier,
        mode: OperationalMode,
        compression_count: u64,
    ) -> TallyResult<ContextSnapshot> {
        let snapshot = ContextSnapshot::capture(context, reason, tier, mode, compression_count)?;

        let policy = RetryPolicy::with_config(self.retry.clone());
        policy
            .execute(|| self.storage.save(&snapshot), None)
            .await
            .into_result()?;

        tracing::info!(
            "Created {} snapshot {} for session {} ({} messages)",
            reason,
            snapshot.id,
            snapshot.session_id,
            snapshot.messages.len()
        );

        let max = self.config.read().max_snapshots;
        if let Err(e) = self.cleanup_old_snapshots(&snapshot.session_id, max).await {
            tracing::warn!("Snapshot retention cleanup failed: {}", e);
        }

        Ok(snapshot)
    }

    /// Load a snapshot, rejecting one whose checksum no longer matches
    pub async fn load_snapshot(&self, id: &str) -> TallyResult<ContextSnapshot> {
        let snapshot = self
            .storage
            .load(id)
            .await?
            .ok_or_else(|| {
                TallyError::not_found_resource(format!("snapshot {} not found", id), "snapshot")
            })?;
        if !snapshot.verify_checksum() {
            return Err(TallyError::storage(format!(
                "snapshot {} failed checksum verification",
                id
            )));
        }
        Ok(snapshot)
    }

    /// Rebuild the conversation stored in a snapshot
    pub async fn restore_snapshot(&self, id: &str) -> TallyResult<ConversationContext> {
        let snapshot = self.load_snapshot(id).await?;
        tracing::info!("Restoring snapshot {} ({})", snapshot.id, snapshot.summary);
        Ok(snapshot.to_context())
    }

    pub async fn list_snapshots(&self, session_id: &str) -> TallyResult<Vec<SnapshotSummary>> {
        self.storage.list(session_id).await
    }

    pub async fn delete_snapshot(&self, id: &str) -> TallyResult<()> {
        self.storage.delete(id).await
    }

    /// Keep the newest `max_count` snapshots of a session. Returns how many were deleted.
    pub async fn cleanup_old_snapshots(&self, session_id: &str, max_count: usize) -> TallyResult<usize> {
        let snapshots = self.storage.list(session_id).await?;
        let mut deleted = 0;
        for old in snapshots.iter().skip(max_count) {
            self.storage.delete(&old.id).await?;
            deleted += 1;
        }
        if deleted > 0 {
            tracing::debug!("Pruned {} old snapshot(s) of session {}", deleted, session_id);
        }
        Ok(deleted)
    }

    /// Register a callback for when usage crosses `fraction`
    pub fn on_context_threshold(&self, fraction: f64, callback: ThresholdCallback) {
        self.watches.lock().push(ThresholdWatch {
            fraction,
            callback,
            armed: true,
        });
    }

    pub fn on_before_overflow(&self, callback: OverflowCallback) {
        self.overflow_callbacks.write().push(callback);
    }

    /// Feed the current usage fraction.
    ///
    /// Registered watches fire once per upward crossing and re-arm when usage drops
    /// back below them. Returns true when the configured snapshot threshold was
    /// just crossed.
    pub fn check_threshold(&self, fraction: f64) -> bool {
        let mut fired: Vec<ThresholdCallback> = Vec::new();
        for watch in self.watches.lock().iter_mut() {
            if crossed(&mut watch.armed, fraction, watch.fraction) {
                fired.push(watch.callback.clone());
            }
        }
        for callback in fired {
            callback(fraction);
        }

        let config = self.config.read();
        if !config.enabled {
            return false;
        }
        let mut armed = self.threshold_armed.load(Ordering::SeqCst);
        let hit = crossed(&mut armed, fraction, config.threshold);
        self.threshold_armed.store(armed, Ordering::SeqCst);
        hit
    }

    /// Run the before-overflow callbacks
    pub fn notify_before_overflow(&self) {
        let callbacks = self.overflow_callbacks.read().clone();
        for callback in callbacks {
            callback();
        }
    }

    /// Count a user turn. Returns true on every `turn_interval`th turn.
    pub fn record_user_turn(&self) -> bool {
        let turns = self.user_turns.fetch_add(1, Ordering::SeqCst) + 1;
        let config = self.config.read();
        config.enabled && config.turn_interval > 0 && turns % config.turn_interval as u64 == 0
    }

    pub fn user_turns(&self) -> u64 {
        self.user_turns.load(Ordering::SeqCst)
    }
}

fn crossed(armed: &mut bool, fraction: f64, threshold: f64) -> bool {
    if fraction >= threshold {
        let fire = *armed;
        *armed = false;
        fire
    } else {
        *armed = true;
        false
    }
}
