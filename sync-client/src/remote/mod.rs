//! Remote store abstraction for kitty-sync.
//!
//! The remote is a document store holding the `sessions` collection and the
//! reference collections. Both the active-session manager and the
//! orchestrator talk to it through [`RemoteStore`].
//!
//! # Design
//!
//! The trait is async and document-oriented:
//! - session CRUD by id, plus a recent-sessions query for the
//!   duplicate-create guard
//! - bulk collection loads with a [`LoadScope`]
//! - long-lived change feeds per collection ([`ChangeFeed`])
//!
//! Delivery on change feeds is at-least-once; consumers merge idempotently.

mod memory;

pub use memory::MemoryRemote;

use async_trait::async_trait;
use tokio::sync::mpsc;

use sync_types::{Collection, Document, SessionId, Timestamp, UserId};

use crate::RemoteError;

/// Which records a bulk load returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadScope {
    /// Only records not flagged `active: false`.
    ActiveOnly,
    /// Records updated at or after the given time.
    UpdatedSince(Timestamp),
    /// Everything, inactive and historical included.
    All,
}

/// Query for sessions created recently by one owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentSessionQuery {
    /// Session owner.
    pub owner_id: UserId,
    /// Oldest creation time to return.
    pub created_since: Timestamp,
}

/// Kind of change delivered on a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedEventKind {
    /// A document appeared.
    Added,
    /// A document changed.
    Modified,
    /// A document was deleted.
    Removed,
}

/// One change-feed event.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: FeedEventKind,
    /// Document id.
    pub id: String,
    /// Document body as the remote sent it (dates not yet normalized).
    pub document: Document,
}

/// A long-lived subscription to one collection.
///
/// Dropping the feed ends the subscription.
#[derive(Debug)]
pub struct ChangeFeed {
    collection: Collection,
    events: mpsc::UnboundedReceiver<ChangeEvent>,
}

impl ChangeFeed {
    /// Wrap a receiver of change events.
    pub fn new(collection: Collection, events: mpsc::UnboundedReceiver<ChangeEvent>) -> Self {
        Self { collection, events }
    }

    /// Collection this feed watches.
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Next event, or `None` once the remote closes the feed.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

/// Remote document store.
///
/// Implementations map their backend failures onto [`RemoteError`]; an
/// unreachable backend must report [`RemoteError::Unavailable`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Create a session document and return its new id.
    async fn create_session(&self, document: Document) -> Result<SessionId, RemoteError>;

    /// Replace a session document.
    ///
    /// Fails with [`RemoteError::NotFound`] if the document does not exist.
    async fn update_session(&self, id: &SessionId, document: Document) -> Result<(), RemoteError>;

    /// Fetch a session document.
    async fn get_session(&self, id: &SessionId) -> Result<Document, RemoteError>;

    /// Delete a session document. Deleting a missing document succeeds.
    async fn delete_session(&self, id: &SessionId) -> Result<(), RemoteError>;

    /// Sessions created by `query.owner_id` since `query.created_since`.
    async fn query_recent_sessions(
        &self,
        query: &RecentSessionQuery,
    ) -> Result<Vec<(SessionId, Document)>, RemoteError>;

    /// Bulk-load a collection. Every returned document carries its `id`.
    async fn load_collection(
        &self,
        collection: Collection,
        scope: LoadScope,
    ) -> Result<Vec<Document>, RemoteError>;

    /// Open a change feed on a collection.
    async fn subscribe(&self, collection: Collection) -> Result<ChangeFeed, RemoteError>;
}
