//! Snapshot storage backends

use async_trait::async_trait;

use super::types::{ContextSnapshot, SnapshotSummary};
use crate::error::TallyResult;

mod file_storage;
mod memory_storage;

pub use file_storage::FileSnapshotStorage;
pub use memory_storage::MemorySnapshotStorage;

/// Persistence contract for snapshots
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    async fn save(&self, snapshot: &ContextSnapshot) -> TallyResult<()>;

    async fn load(&self, id: &str) -> TallyResult<Option<ContextSnapshot>>;

    /// Snapshots of a session, newest first
    async fn list(&self, session_id: &str) -> TallyResult<Vec<SnapshotSummary>>;

    /// Delete a snapshot; deleting a missing one is not an error
    async fn delete(&self, id: &str) -> TallyResult<()>;

    async fn exists(&self, id: &str) -> TallyResult<bool>;

    /// Whether the stored snapshot is intact: readable, self-consistent and
    /// matching its checksum. Missing snapshots are not intact.
    async fn verify(&self, id: &str) -> TallyResult<bool>;
}
