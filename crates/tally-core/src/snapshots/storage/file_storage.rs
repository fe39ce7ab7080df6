//! File-based snapshot storage

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::super::types::{ContextSnapshot, SnapshotSummary};
use super::SnapshotStorage;
use crate::error::{TallyError, TallyResult};

/// Stores one JSON document per snapshot:
/// ```text
/// base_path/
///   {encoded session_id}/
///     {snapshot_id}.json
/// ```
/// Writes go to a temporary file that is renamed into place, so a crash never
/// leaves a half-written snapshot under its final name.
pub struct FileSnapshotStorage {
    base_path: PathBuf,
}

impl FileSnapshotStorage {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.base_path.join(encode_session_dir(session_id))
    }

    /// Locate a snapshot file by id across session directories
    async fn find(&self, id: &str) -> TallyResult<Option<PathBuf>> {
        validate_id(id)?;
        if !fs::try_exists(&self.base_path).await.unwrap_or(false) {
            return Ok(None);
        }

        let file_name = format!("{}.json", id);
        let mut entries = fs::read_dir(&self.base_path).await.map_err(|e| {
            TallyError::storage(format!("Failed to read snapshot directory: {}", e))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TallyError::storage(format!("Failed to read directory entry: {}", e)))?
        {
            let candidate = entry.path().join(&file_name);
            if fs::try_exists(&candidate).await.unwrap_or(false) {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn read(&self, path: &Path) -> TallyResult<ContextSnapshot> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| TallyError::storage(format!("Failed to read snapshot file: {}", e)))?;
        serde_json::from_str(&content)
            .map_err(|e| TallyError::storage(format!("Failed to deserialize snapshot: {}", e)))
    }
}

#[async_trait]
impl SnapshotStorage for FileSnapshotStorage {
    async fn save(&self, snapshot: &ContextSnapshot) -> TallyResult<()> {
        validate_id(&snapshot.id)?;
        let dir = self.session_dir(&snapshot.session_id);
        fs::create_dir_all(&dir).await.map_err(|e| {
            TallyError::storage(format!("Failed to create snapshot directory: {}", e))
        })?;

        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| TallyError::storage(format!("Failed to serialize snapshot: {}", e)))?;

        let path = dir.join(format!("{}.json", snapshot.id));
        let tmp_path = dir.join(format!("{}.json.tmp", snapshot.id));
        let mut file = fs::File::create(&tmp_path)
            .await
            .map_err(|e| TallyError::storage(format!("Failed to create snapshot file: {}", e)))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| TallyError::storage(format!("Failed to write snapshot file: {}", e)))?;
        file.sync_all()
            .await
            .map_err(|e| TallyError::storage(format!("Failed to sync snapshot file: {}", e)))?;
        drop(file);
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| TallyError::storage(format!("Failed to move snapshot into place: {}", e)))?;

        tracing::debug!("Saved snapshot {} to {:?}", snapshot.id, path);
        Ok(())
    }

    async fn load(&self, id: &str) -> TallyResult<Option<ContextSnapshot>> {
        match self.find(id).await? {
            Some(path) => Ok(Some(self.read(&path).await?)),
            None => Ok(None),
        }
    }

    async fn list(&self, session_id: &str) -> TallyResult<Vec<SnapshotSummary>> {
        let dir = self.session_dir(session_id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(Vec::new());
        }

        let mut summaries = Vec::new();
        let mut entries = fs::read_dir(&dir).await.map_err(|e| {
            TallyError::storage(format!("Failed to read snapshot directory: {}", e))
        })?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| TallyError::storage(format!("Failed to read directory entry: {}", e)))?
        {
            let path = entry.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match self.read(&path).await {
                Ok(snapshot) if snapshot.session_id == session_id => {
                    summaries.push(SnapshotSummary::from(&snapshot))
                }
                Ok(snapshot) => tracing::warn!(
                    "Snapshot {} in directory of session {} belongs to session {}",
                    snapshot.id,
                    session_id,
                    snapshot.session_id
                ),
                Err(e) => tracing::warn!("Skipping unreadable snapshot {:?}: {}", path, e),
            }
        }

        summaries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> TallyResult<()> {
        if let Some(path) = self.find(id).await? {
            fs::remove_file(&path).await.map_err(|e| {
                TallyError::storage(format!("Failed to delete snapshot file: {}", e))
            })?;
            tracing::debug!("Deleted snapshot {}", id);
        }
        Ok(())
    }

    async fn exists(&self, id: &str) -> TallyResult<bool> {
        Ok(self.find(id).await?.is_some())
    }

    async fn verify(&self, id: &str) -> TallyResult<bool> {
        let Some(path) = self.find(id).await? else {
            return Ok(false);
        };
        match self.read(&path).await {
            Ok(snapshot) => Ok(snapshot.id == id && snapshot.verify_checksum()),
            Err(e) => {
                tracing::warn!("Snapshot {} failed verification: {}", id, e);
                Ok(false)
            }
        }
    }
}

/// Reject ids that could escape the session directory
fn validate_id(id: &str) -> TallyResult<()> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(TallyError::invalid_input_field(
            format!("invalid snapshot id: {:?}", id),
            "id",
        ))
    }
}

/// Map a session id to a directory name, one-to-one.
///
/// ASCII alphanumerics and `-` pass through; every other byte becomes `_XX`.
/// The empty id maps to a lone `_`, which no other id produces.
fn encode_session_dir(session_id: &str) -> String {
    if session_id.is_empty() {
        return "_".to_string();
    }
    let mut encoded = String::with_capacity(session_id.len());
    for byte in session_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("_{:02X}", byte));
        }
    }
    encoded
}
