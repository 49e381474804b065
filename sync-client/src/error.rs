//! Error types for sync-client.
//!
//! Lower layers get their own enums; everything the services return is a
//! [`SyncError`]. `SyncError` is `Clone` because one in-flight flush result
//! is handed to every caller that joined it.

use sync_core::IllegalTransition;
use sync_types::{SchemaError, SessionId};

/// Remote store failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// The remote store could not be reached.
    #[error("remote unavailable: {0}")]
    Unavailable(String),

    /// The addressed document does not exist.
    #[error("document not found: {collection}/{id}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Document id.
        id: String,
    },

    /// The remote access policy rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Local durable storage failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing a key failed.
    #[error("storage I/O error for {key}: {message}")]
    Io {
        /// Storage key.
        key: String,
        /// Underlying error message.
        message: String,
    },

    /// A stored value could not be encoded or decoded.
    #[error("storage serialization error for {key}: {message}")]
    Serialization {
        /// Storage key.
        key: String,
        /// Underlying error message.
        message: String,
    },
}

/// Main error type for sync operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Offline, or the remote could not be reached. Recoverable: the data
    /// stays local and is flushed later.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// The remote document was deleted externally. Recoverable: the
    /// document is recreated under a new id.
    #[error("remote document missing: {id}")]
    RemoteDocumentMissing {
        /// Id that no longer exists remotely.
        id: SessionId,
    },

    /// The remote access policy rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The entity could not be encoded, or a mutation was illegal.
    #[error("validation error: {0}")]
    Validation(String),

    /// Local durable storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Any other remote failure.
    #[error("remote error: {0}")]
    Remote(String),

    /// The operation needs an active session and there is none.
    #[error("no active session")]
    NoActiveSession,

    /// The manager is being cleared or was shut down; no new work may start.
    #[error("session is being torn down")]
    TearingDown,
}

impl SyncError {
    /// Errors that degrade to "stay local, retry later".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable
                | SyncError::RemoteDocumentMissing { .. }
                | SyncError::Remote(_)
        )
    }
}

impl From<RemoteError> for SyncError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unavailable(_) => SyncError::NetworkUnavailable,
            RemoteError::NotFound { id, .. } => SyncError::RemoteDocumentMissing {
                id: SessionId::new(id),
            },
            RemoteError::PermissionDenied(reason) => SyncError::PermissionDenied(reason),
            RemoteError::Backend(message) => SyncError::Remote(message),
        }
    }
}

impl From<SchemaError> for SyncError {
    fn from(err: SchemaError) -> Self {
        SyncError::Validation(err.to_string())
    }
}

impl From<IllegalTransition> for SyncError {
    fn from(err: IllegalTransition) -> Self {
        SyncError::Validation(err.to_string())
    }
}
