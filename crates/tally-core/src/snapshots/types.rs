//! Snapshot types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::checkpoints::CompressionCheckpoint;
use crate::context::{ContextMetadata, ConversationContext, ProtectedContent};
use crate::error::{ResultExt, TallyResult};
use crate::llm::Message;
use crate::tiers::{ContextTier, OperationalMode};

/// What triggered a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    Manual,
    /// Usage crossed the snapshot threshold
    Threshold,
    /// Last chance before the window overflows
    BeforeOverflow,
    /// Every N user turns
    Periodic,
    /// Taken right before an emergency rollover
    Rollover,
}

impl fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SnapshotReason::Manual => "manual",
            SnapshotReason::Threshold => "threshold",
            SnapshotReason::BeforeOverflow => "before_overflow",
            SnapshotReason::Periodic => "periodic",
            SnapshotReason::Rollover => "rollover",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub reason: SnapshotReason,
    pub tier: ContextTier,
    pub mode: OperationalMode,
    pub max_tokens: usize,
    pub system_prompt: String,
    pub protected: ProtectedContent,
    pub context: ContextMetadata,
    pub compression_count: u64,
    pub created_at: DateTime<Utc>,
    /// SHA-256 over the canonical JSON of the snapshot with this field blank
    pub checksum: String,
}

/// Point-in-time copy of a conversation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: usize,
    /// One-line description for listings
    pub summary: String,
    pub messages: Vec<Message>,
    pub checkpoints: Vec<CompressionCheckpoint>,
    pub metadata: SnapshotMetadata,
}

impl ContextSnapshot {
    /// Capture `context` as it is now
    pub fn capture(
        context: &ConversationContext,
        reason: SnapshotReason,
        tier: ContextTier,
        mode: OperationalMode,
        compression_count: u64,
    ) -> TallyResult<Self> {
        let timestamp = Utc::now();
        let summary = format!(
            "{} messages, {} tokens, {} checkpoints ({})",
            context.messages.len(),
            context.token_count,
            context.checkpoints.len(),
            reason
        );

        let mut snapshot = Self {
            id: format!("snap-{}", Uuid::new_v4().simple()),
            session_id: context.session_id.clone(),
            timestamp,
            token_count: context.token_count,
            summary,
            messages: context.messages.clone(),
            checkpoints: context.checkpoints.clone(),
            metadata: SnapshotMetadata {
                reason,
                tier,
                mode,
                max_tokens: context.max_tokens,
                system_prompt: context.system_prompt.clone(),
                protected: context.protected.clone(),
                context: context.metadata.clone(),
                compression_count,
                created_at: timestamp,
                checksum: String::new(),
            },
        };
        snapshot.metadata.checksum = snapshot.compute_checksum()?;
        Ok(snapshot)
    }

    /// Whether the stored checksum still matches the content
    pub fn verify_checksum(&self) -> bool {
        match self.compute_checksum() {
            Ok(checksum) => checksum == self.metadata.checksum,
            Err(e) => {
                tracing::warn!("Cannot checksum snapshot {}: {}", self.id, e);
                false
            }
        }
    }

    /// Hash every field except the checksum itself.
    ///
    /// Going through `serde_json::Value` sorts object keys, so map fields hash
    /// the same regardless of iteration order.
    fn compute_checksum(&self) -> TallyResult<String> {
        let mut unsealed = self.clone();
        unsealed.metadata.checksum.clear();
        let value = serde_json::to_value(&unsealed).context("serializing snapshot for checksum")?;
        let bytes = serde_json::to_vec(&value).context("encoding snapshot for checksum")?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }

    /// Rebuild a live context from this snapshot
    pub fn to_context(&self) -> ConversationContext {
        let mut context = ConversationContext::new(
            self.session_id.clone(),
            self.metadata.system_prompt.clone(),
            self.metadata.max_tokens,
        );
        context.replace_messages(self.messages.clone());
        context.token_count = self.token_count;
        context.checkpoints = self.checkpoints.clone();
        context.protected = self.metadata.protected.clone();
        context.metadata = self.metadata.context.clone();
        context.metadata.last_snapshot_id = Some(self.id.clone());
        context
    }
}

/// Listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub token_count: usize,
    pub message_count: usize,
    pub reason: SnapshotReason,
    pub summary: String,
}

impl From<&ContextSnapshot> for SnapshotSummary {
    fn from(snapshot: &ContextSnapshot) -> Self {
        Self {
            id: snapshot.id.clone(),
            session_id: snapshot.session_id.clone(),
            timestamp: snapshot.timestamp,
            token_count: snapshot.token_count,
            message_count: snapshot.messages.len(),
            reason: snapshot.metadata.reason,
            summary: snapshot.summary.clone(),
        }
    }
}

/// Snapshot triggers and retention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    /// Usage fraction that triggers a snapshot
    pub threshold: f64,
    /// Snapshot every N user turns; 0 disables the turn trigger
    pub turn_interval: u32,
    /// Snapshots kept per session
    pub max_snapshots: usize,
    /// Base directory for file storage; in-memory storage when unset
    pub storage_dir: Option<PathBuf>,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.85,
            turn_interval: 5,
            max_snapshots: 10,
            storage_dir: None,
        }
    }
}

impl SnapshotConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_turn_interval(mut self, turns: u32) -> Self {
        self.turn_interval = turns;
        self
    }

    pub fn with_max_snapshots(mut self, max: usize) -> Self {
        self.max_snapshots = max;
        self
    }

    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }
}
