//! Typed events published to collaborators (UI, telemetry)
//!
//! The event set is closed: every notification the engine can raise is a variant of
//! [`ContextEvent`], and [`ContextEvent::event_type`] yields its stable wire name.

use tokio::sync::broadcast;

use crate::compression::CompressionStrategy;
use crate::guard::MemoryLevel;
use crate::llm::MessageRole;
use crate::pool::ContextUsage;
use crate::snapshots::SnapshotReason;
use crate::tiers::{ContextTier, OperationalMode, TierStrategy};


/// Everything the context engine reports to the outside world
#[derive(Debug, Clone, PartialEq)]
pub enum ContextEvent {
    /// The manager finished starting up
    Started {
        session_id: String,
        tier: ContextTier,
        mode: OperationalMode,
        max_tokens: usize,
    },

    /// Tier re-detected after a size or policy change
    TierChanged {
        from: ContextTier,
        to: ContextTier,
        strategy: TierStrategy,
        max_checkpoints: usize,
    },

    ModeChanged {
        from: OperationalMode,
        to: OperationalMode,
    },

    /// The context window size changed
    ContextResized {
        old_size: usize,
        new_size: usize,
    },

    MessageAdded {
        message_id: String,
        role: MessageRole,
        tokens: usize,
        usage: ContextUsage,
    },

    /// Accelerator memory dropped below the low-memory threshold
    LowMemory {
        available: u64,
        total: u64,
    },

    /// Context usage entered a warning level
    LowMemoryWarning {
        level: MemoryLevel,
        percentage: f64,
    },

    AutoSnapshotCreated {
        snapshot_id: String,
        reason: SnapshotReason,
    },

    AutoSnapshotFailed {
        reason: SnapshotReason,
        error: String,
    },

    AutoSummaryCreated {
        checkpoint_id: String,
        strategy: CompressionStrategy,
        original_tokens: usize,
        compressed_tokens: usize,
        messages_compressed: usize,
    },

    /// Summarization failed and a placeholder was used, or compression itself failed
    AutoSummaryFailed {
        error: String,
    },

    EmergencyCompression {
        percentage: f64,
        tokens_before: usize,
        tokens_after: usize,
    },

    EmergencyRollover {
        percentage: f64,
        snapshot_id: Option<String>,
        messages_kept: usize,
    },

    /// A compression attempt was discarded by the inflation guard
    CompressionSkipped {
        reason: String,
        original_tokens: usize,
        compressed_tokens: usize,
    },

    ConfigUpdated,

    UsageUpdated(ContextUsage),
}

impl ContextEvent {
    /// Stable event name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::TierChanged { .. } => "tier-changed",
            Self::ModeChanged { .. } => "mode-changed",
            Self::ContextResized { .. } => "context-resized",
            Self::MessageAdded { .. } => "message-added",
            Self::LowMemory { .. } => "low-memory",
            Self::LowMemoryWarning { .. } => "low-memory-warning",
            Self::AutoSnapshotCreated { .. } => "auto-snapshot-created",
            Self::AutoSnapshotFailed { .. } => "auto-snapshot-failed",
            Self::AutoSummaryCreated { .. } => "auto-summary-created",
            Self::AutoSummaryFailed { .. } => "auto-summary-failed",
            Self::EmergencyCompression { .. } => "emergency-compression",
            Self::EmergencyRollover { .. } => "emergency-rollover",
            Self::CompressionSkipped { .. } => "compression-skipped",
            Self::ConfigUpdated => "config-updated",
            Self::UsageUpdated(_) => "usage-updated",
        }
    }

    /// Events that alter history the user relies on
    pub fn is_emergency(&self) -> bool {
        matches!(
            self,
            Self::EmergencyCompression { .. } | Self::EmergencyRollover { .. }
        )
    }
}

/// Broadcast bus for [`ContextEvent`]s.
///
/// Cloning the bus shares the underlying channel. Publishing with no subscribers is
/// not an error.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ContextEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event, returning how many subscribers received it
    pub fn publish(&self, event: ContextEvent) -> usize {
        tracing::trace!("event: {}", event.event_type());
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ContextEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
