//! Local durable storage for the active session.
//!
//! [`LocalStore`] is a small async key-value store. [`SessionMirror`] puts
//! the active-session layout on top of it:
//!
//! - `active-session-id` - pointer to the current session id
//! - `active-session-snapshot` - full JSON mirror of the session
//! - `handled-deleted:<id>` - bounded set of discarded-session markers
//!
//! The active-session manager is the only writer.

mod file;
mod memory;

pub use file::FileLocalStore;
pub use memory::MemoryLocalStore;

use async_trait::async_trait;
use std::sync::Arc;

use sync_core::{marker_key, MarkerPolicy, MARKER_PREFIX};
use sync_types::{ActiveSession, SessionId, Timestamp};

use crate::StorageError;

/// Key of the active-session id pointer.
pub const ACTIVE_SESSION_ID_KEY: &str = "active-session-id";

/// Key of the active-session snapshot.
pub const ACTIVE_SESSION_SNAPSHOT_KEY: &str = "active-session-snapshot";

/// Async string key-value store.
#[async_trait]
pub trait LocalStore: Send + Sync + std::fmt::Debug {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn set(&self, key: &str, value: String) -> Result<(), StorageError>;

    /// Delete a value. Deleting a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Every key starting with `prefix`.
    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// The active-session layout over a [`LocalStore`].
#[derive(Debug, Clone)]
pub struct SessionMirror {
    store: Arc<dyn LocalStore>,
}

impl SessionMirror {
    /// Wrap a store.
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }

    /// Write the pointer (when the session has an id) and the snapshot.
    pub async fn write(&self, session: &ActiveSession) -> Result<(), StorageError> {
        let snapshot =
            serde_json::to_string(session).map_err(|e| StorageError::Serialization {
                key: ACTIVE_SESSION_SNAPSHOT_KEY.into(),
                message: e.to_string(),
            })?;
        self.store
            .set(ACTIVE_SESSION_SNAPSHOT_KEY, snapshot)
            .await?;
        match &session.id {
            Some(id) => {
                self.store
                    .set(ACTIVE_SESSION_ID_KEY, id.as_str().to_string())
                    .await
            }
            None => self.store.remove(ACTIVE_SESSION_ID_KEY).await,
        }
    }

    /// The stored session id pointer.
    pub async fn pointer(&self) -> Result<Option<SessionId>, StorageError> {
        Ok(self
            .store
            .get(ACTIVE_SESSION_ID_KEY)
            .await?
            .filter(|id| !id.is_empty())
            .map(SessionId::new))
    }

    /// The stored snapshot.
    pub async fn snapshot(&self) -> Result<Option<ActiveSession>, StorageError> {
        match self.store.get(ACTIVE_SESSION_SNAPSHOT_KEY).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Serialization {
                    key: ACTIVE_SESSION_SNAPSHOT_KEY.into(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// The snapshot, only if it belongs to `id`.
    pub async fn snapshot_for(&self, id: &SessionId) -> Result<Option<ActiveSession>, StorageError> {
        Ok(self
            .snapshot()
            .await?
            .filter(|s| s.id.as_ref() == Some(id)))
    }

    /// Remove pointer and snapshot.
    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.remove(ACTIVE_SESSION_ID_KEY).await?;
        self.store.remove(ACTIVE_SESSION_SNAPSHOT_KEY).await
    }

    /// Record that `id` was discarded at `at`.
    pub async fn mark_handled(&self, id: &SessionId, at: Timestamp) -> Result<(), StorageError> {
        self.store
            .set(&marker_key(id), at.as_millis().to_string())
            .await
    }

    /// Whether `id` carries a handled-deleted marker.
    pub async fn is_handled(&self, id: &SessionId) -> Result<bool, StorageError> {
        Ok(self.store.get(&marker_key(id)).await?.is_some())
    }

    /// Remove the marker of `id`.
    pub async fn unmark_handled(&self, id: &SessionId) -> Result<(), StorageError> {
        self.store.remove(&marker_key(id)).await
    }

    /// Every marker with its handled-at time. Unreadable times count as the epoch.
    pub async fn markers(&self) -> Result<Vec<(String, Timestamp)>, StorageError> {
        let mut markers = Vec::new();
        for key in self.store.keys_with_prefix(MARKER_PREFIX).await? {
            let at = self
                .store
                .get(&key)
                .await?
                .and_then(|raw| raw.parse::<u64>().ok())
                .map(Timestamp::from_millis)
                .unwrap_or_default();
            markers.push((key, at));
        }
        Ok(markers)
    }

    /// Apply the marker policy; returns how many markers were removed.
    pub async fn collect_markers(&self, policy: MarkerPolicy) -> Result<usize, StorageError> {
        let expired = policy.expired(&self.markers().await?);
        for key in &expired {
            self.store.remove(key).await?;
        }
        Ok(expired.len())
    }
}
