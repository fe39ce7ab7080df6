//! Per-session operation serialization
//!
//! Externally triggered operations on the same session (compress, snapshot, resize)
//! must apply in arrival order and never overlap. [`SessionRegistry`] gives every
//! session its own FIFO-fair lock and cancellation token; sessions never share
//! synchronization state.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{TallyError, TallyResult};

#[cfg(test)]
mod tests;

/// Unique identifier for a session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

struct SessionSlot<T> {
    state: Arc<Mutex<T>>,
    token: CancellationToken,
}

/// Owns per-session state behind one lock per session.
///
/// Session tokens are children of a root token, so [`cancel_all`](Self::cancel_all)
/// aborts queued operations everywhere.
pub struct SessionRegistry<T> {
    root: CancellationToken,
    sessions: DashMap<SessionId, SessionSlot<T>>,
}

impl<T> Default for SessionRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SessionRegistry<T> {
    pub fn new() -> Self {
        Self {
            root: CancellationToken::new(),
            sessions: DashMap::new(),
        }
    }

    /// Register a session, replacing and cancelling any previous one with the same id
    pub fn insert(&self, id: impl Into<SessionId>, value: T) -> CancellationToken {
        let token = self.root.child_token();
        let slot = SessionSlot {
            state: Arc::new(Mutex::new(value)),
            token: token.clone(),
        };
        if let Some(previous) = self.sessions.insert(id.into(), slot) {
            previous.token.cancel();
        }
        token
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<Mutex<T>>> {
        self.sessions.get(id).map(|slot| slot.state.clone())
    }

    pub fn session_token(&self, id: &SessionId) -> Option<CancellationToken> {
        self.sessions.get(id).map(|slot| slot.token.clone())
    }

    /// Remove a session and cancel operations still queued on it
    pub fn remove(&self, id: &SessionId) -> Option<Arc<Mutex<T>>> {
        self.sessions.remove(id).map(|(_, slot)| {
            slot.token.cancel();
            slot.state
        })
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    /// Run `operation` with exclusive access to the session state.
    ///
    /// Operations on one session run one at a time in the order they queued.
    /// Returns [`TallyError::Cancelled`] if the session is cancelled while waiting.
    pub async fn execute<R, F>(&self, id: &SessionId, operation: F) -> TallyResult<R>
    where
        F: for<'a> FnOnce(&'a mut T) -> BoxFuture<'a, R>,
    {
        let (state, token) = {
            let slot = self.sessions.get(id).ok_or_else(|| {
                TallyError::not_found_resource(format!("session {} not registered", id), "session")
            })?;
            (slot.state.clone(), slot.token.clone())
        };

        let mut guard = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TallyError::Cancelled),
            guard = state.lock() => guard,
        };
        tracing::debug!("Running serialized operation for session {}", id);
        Ok(operation(&mut guard).await)
    }
}
