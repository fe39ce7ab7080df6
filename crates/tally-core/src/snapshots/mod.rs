//! Durable conversation snapshots for crash and overflow recovery
//!
//! Snapshots are created on usage thresholds, before overflow and every few user
//! turns, then pruned oldest-first. Storage failures are retried and reported but
//! never block the conversation.

mod manager;
mod storage;
mod types;

#[cfg(test)]
mod tests;

pub use manager::{OverflowCallback, SnapshotManager, ThresholdCallback};
pub use storage::{FileSnapshotStorage, MemorySnapshotStorage, SnapshotStorage};
pub use types::{ContextSnapshot, SnapshotConfig, SnapshotMetadata, SnapshotReason, SnapshotSummary};
