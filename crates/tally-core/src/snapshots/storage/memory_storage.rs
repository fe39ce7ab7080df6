//! In-memory snapshot storage

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::super::types::{ContextSnapshot, SnapshotSummary};
use super::SnapshotStorage;
use crate::error::{TallyError, TallyResult};

/// Snapshot storage kept in process memory, for ephemeral sessions and tests
#[derive(Default)]
pub struct MemorySnapshotStorage {
    snapshots: RwLock<HashMap<String, ContextSnapshot>>,
    fail_writes: AtomicBool,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `save` fail with a storage error
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStorage for MemorySnapshotStorage {
    async fn save(&self, snapshot: &ContextSnapshot) -> TallyResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TallyError::storage("snapshot storage is read-only"));
        }
        self.snapshots
            .write()
            .await
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> TallyResult<Option<ContextSnapshot>> {
        Ok(self.snapshots.read().await.get(id).cloned())
    }

    async fn list(&self, session_id: &str) -> TallyResult<Vec<SnapshotSummary>> {
        let snapshots = self.snapshots.read().await;
        let mut summaries: Vec<_> = snapshots
            .values()
            .filter(|s| s.session_id == session_id)
            .map(SnapshotSummary::from)
            .collect();
        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> TallyResult<()> {
        self.snapshots.write().await.remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> TallyResult<bool> {
        Ok(self.snapshots.read().await.contains_key(id))
    }

    async fn verify(&self, id: &str) -> TallyResult<bool> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(id)
            .is_some_and(|s| s.id == id && s.verify_checksum()))
    }
}
