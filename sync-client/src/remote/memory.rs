//! In-memory remote store.
//!
//! Plays the role of the remote in tests and local development: documents
//! live in per-collection maps, writes are counted, failures can be queued
//! per operation and every write is echoed on the collection's change feeds.

use super::{ChangeEvent, ChangeFeed, FeedEventKind, LoadScope, RecentSessionQuery, RemoteStore};
use crate::RemoteError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use sync_types::{Collection, Document, SessionId};
use tokio::sync::mpsc;

/// In-memory remote store.
///
/// Clones share state, so a test can keep a handle while a service owns
/// another.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

#[derive(Debug, Default)]
struct MemoryRemoteInner {
    collections: HashMap<Collection, BTreeMap<String, Document>>,
    feeds: HashMap<Collection, Vec<mpsc::UnboundedSender<ChangeEvent>>>,
    offline: bool,
    latency: Option<Duration>,
    creates: usize,
    updates: usize,
    deletes: usize,
    loads: HashMap<Collection, usize>,
    fail_next_create: Option<RemoteError>,
    fail_next_update: Option<RemoteError>,
    fail_next_get: Option<RemoteError>,
    fail_next_delete: Option<RemoteError>,
    fail_next_query: Option<RemoteError>,
    fail_next_load: HashMap<Collection, VecDeque<RemoteError>>,
}

impl MemoryRemoteInner {
    fn check_online(&self) -> Result<(), RemoteError> {
        if self.offline {
            Err(RemoteError::Unavailable("offline".into()))
        } else {
            Ok(())
        }
    }

    fn emit(&mut self, collection: Collection, kind: FeedEventKind, id: &str, document: Document) {
        if let Some(senders) = self.feeds.get_mut(&collection) {
            let event = ChangeEvent {
                kind,
                id: id.to_string(),
                document,
            };
            senders.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn put(&mut self, collection: Collection, id: &str, mut document: Document) {
        document.insert("id".into(), Value::String(id.to_string()));
        let existed = self
            .collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), document.clone())
            .is_some();
        let kind = if existed {
            FeedEventKind::Modified
        } else {
            FeedEventKind::Added
        };
        self.emit(collection, kind, id, document);
    }

    fn take(&mut self, collection: Collection, id: &str) -> Option<Document> {
        let removed = self.collections.get_mut(&collection)?.remove(id)?;
        self.emit(collection, FeedEventKind::Removed, id, removed.clone());
        Some(removed)
    }
}

impl MemoryRemote {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRemoteInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }
    }

    /// Write a document as another client would: not counted, but echoed on
    /// the collection's feeds.
    pub fn insert(&self, collection: Collection, id: &str, document: Document) {
        self.lock().put(collection, id, document);
    }

    /// Delete a document as another client would.
    pub fn remove(&self, collection: Collection, id: &str) -> Option<Document> {
        self.lock().take(collection, id)
    }

    /// Read a stored document.
    pub fn document(&self, collection: Collection, id: &str) -> Option<Document> {
        self.lock()
            .collections
            .get(&collection)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Number of documents in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.lock()
            .collections
            .get(&collection)
            .map_or(0, BTreeMap::len)
    }

    /// Whether a collection holds no documents.
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Make every operation fail with [`RemoteError::Unavailable`].
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Delay every operation by `latency` before it runs.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = Some(latency);
    }

    /// Sessions created through [`RemoteStore::create_session`].
    pub fn create_count(&self) -> usize {
        self.lock().creates
    }

    /// Sessions updated through [`RemoteStore::update_session`].
    pub fn update_count(&self) -> usize {
        self.lock().updates
    }

    /// Sessions deleted through [`RemoteStore::delete_session`].
    pub fn delete_count(&self) -> usize {
        self.lock().deletes
    }

    /// Creates plus updates.
    pub fn write_count(&self) -> usize {
        let inner = self.lock();
        inner.creates + inner.updates
    }

    /// Bulk loads attempted on a collection, failed ones included.
    pub fn load_count(&self, collection: Collection) -> usize {
        self.lock().loads.get(&collection).copied().unwrap_or(0)
    }

    /// Open feeds on a collection.
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        let mut inner = self.lock();
        match inner.feeds.get_mut(&collection) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }

    /// Cause the next create to fail with the given error.
    pub fn fail_next_create(&self, error: RemoteError) {
        self.lock().fail_next_create = Some(error);
    }

    /// Cause the next update to fail with the given error.
    pub fn fail_next_update(&self, error: RemoteError) {
        self.lock().fail_next_update = Some(error);
    }

    /// Cause the next get to fail with the given error.
    pub fn fail_next_get(&self, error: RemoteError) {
        self.lock().fail_next_get = Some(error);
    }

    /// Cause the next delete to fail with the given error.
    pub fn fail_next_delete(&self, error: RemoteError) {
        self.lock().fail_next_delete = Some(error);
    }

    /// Cause the next recent-sessions query to fail with the given error.
    pub fn fail_next_query(&self, error: RemoteError) {
        self.lock().fail_next_query = Some(error);
    }

    /// Queue a failure for the next load of `collection`. Queued failures
    /// are consumed one per load.
    pub fn fail_next_load(&self, collection: Collection, error: RemoteError) {
        self.lock()
            .fail_next_load
            .entry(collection)
            .or_default()
            .push_back(error);
    }

    /// Clear all state (documents, feeds, counters, failures).
    pub fn reset(&self) {
        *self.lock() = MemoryRemoteInner::default();
    }
}

impl Clone for MemoryRemote {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn in_scope(document: &Document, scope: LoadScope) -> bool {
    match scope {
        LoadScope::All => true,
        LoadScope::ActiveOnly => document.get("active").and_then(Value::as_bool) != Some(false),
        LoadScope::UpdatedSince(since) => document
            .get("updatedAt")
            .and_then(Value::as_u64)
            .is_some_and(|at| at >= since.as_millis()),
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn create_session(&self, document: Document) -> Result<SessionId, RemoteError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.check_online()?;

        // Check for forced failure
        if let Some(error) = inner.fail_next_create.take() {
            return Err(error);
        }

        let id = SessionId::generate();
        inner.put(Collection::Sessions, id.as_str(), document);
        inner.creates += 1;
        Ok(id)
    }

    async fn update_session(&self, id: &SessionId, document: Document) -> Result<(), RemoteError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.check_online()?;

        if let Some(error) = inner.fail_next_update.take() {
            return Err(error);
        }

        let exists = inner
            .collections
            .get(&Collection::Sessions)
            .is_some_and(|docs| docs.contains_key(id.as_str()));
        if !exists {
            return Err(RemoteError::NotFound {
                collection: Collection::Sessions.to_string(),
                id: id.to_string(),
            });
        }

        inner.put(Collection::Sessions, id.as_str(), document);
        inner.updates += 1;
        Ok(())
    }

    async fn get_session(&self, id: &SessionId) -> Result<Document, RemoteError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.check_online()?;

        if let Some(error) = inner.fail_next_get.take() {
            return Err(error);
        }

        inner
            .collections
            .get(&Collection::Sessions)
            .and_then(|docs| docs.get(id.as_str()).cloned())
            .ok_or_else(|| RemoteError::NotFound {
                collection: Collection::Sessions.to_string(),
                id: id.to_string(),
            })
    }

    async fn delete_session(&self, id: &SessionId) -> Result<(), RemoteError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.check_online()?;

        if let Some(error) = inner.fail_next_delete.take() {
            return Err(error);
        }

        if inner.take(Collection::Sessions, id.as_str()).is_some() {
            inner.deletes += 1;
        }
        Ok(())
    }

    async fn query_recent_sessions(
        &self,
        query: &RecentSessionQuery,
    ) -> Result<Vec<(SessionId, Document)>, RemoteError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        inner.check_online()?;

        if let Some(error) = inner.fail_next_query.take() {
            return Err(error);
        }

        let since = query.created_since.as_millis();
        let matches = inner
            .collections
            .get(&Collection::Sessions)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, doc)| {
                        doc.get("ownerId").and_then(Value::as_str) == Some(query.owner_id.as_str())
                            && doc
                                .get("createdAt")
                                .and_then(Value::as_u64)
                                .is_some_and(|at| at >= since)
                    })
                    .map(|(id, doc)| (SessionId::new(id.as_str()), doc.clone()))
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }

    async fn load_collection(
        &self,
        collection: Collection,
        scope: LoadScope,
    ) -> Result<Vec<Document>, RemoteError> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        *inner.loads.entry(collection).or_default() += 1;
        inner.check_online()?;

        if let Some(error) = inner
            .fail_next_load
            .get_mut(&collection)
            .and_then(VecDeque::pop_front)
        {
            return Err(error);
        }

        Ok(inner
            .collections
            .get(&collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| in_scope(doc, scope))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn subscribe(&self, collection: Collection) -> Result<ChangeFeed, RemoteError> {
        let mut inner = self.lock();
        inner.check_online()?;

        let (tx, rx) = mpsc::unbounded_channel();
        inner.feeds.entry(collection).or_default().push(tx);
        Ok(ChangeFeed::new(collection, rx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_types::{Timestamp, UserId};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    // ===========================================
    // Session CRUD Tests
    // ===========================================

    #[tokio::test]
    async fn create_assigns_id_and_counts() {
        let remote = MemoryRemote::new();
        let id = remote
            .create_session(doc(json!({ "ownerId": "u1" })))
            .await
            .unwrap();

        assert_eq!(remote.create_count(), 1);
        let stored = remote.document(Collection::Sessions, id.as_str()).unwrap();
        assert_eq!(stored["id"], json!(id.as_str()));
        assert_eq!(remote.get_session(&id).await.unwrap(), stored);
    }

    #[tokio::test]
    async fn update_of_missing_document_is_not_found() {
        let remote = MemoryRemote::new();
        let result = remote
            .update_session(&SessionId::new("gone"), Document::new())
            .await;
        assert!(matches!(result, Err(RemoteError::NotFound { .. })));
        assert_eq!(remote.update_count(), 0);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let remote = MemoryRemote::new();
        let id = remote.create_session(Document::new()).await.unwrap();
        remote.delete_session(&id).await.unwrap();
        remote.delete_session(&id).await.unwrap();
        assert_eq!(remote.delete_count(), 1);
        assert!(remote.is_empty(Collection::Sessions));
    }

    #[tokio::test]
    async fn offline_remote_is_unavailable() {
        let remote = MemoryRemote::new();
        remote.set_offline(true);
        assert!(matches!(
            remote.create_session(Document::new()).await,
            Err(RemoteError::Unavailable(_))
        ));
        assert!(matches!(
            remote.subscribe(Collection::Groups).await,
            Err(RemoteError::Unavailable(_))
        ));

        remote.set_offline(false);
        assert!(remote.create_session(Document::new()).await.is_ok());
    }

    #[tokio::test]
    async fn fail_next_is_consumed_once() {
        let remote = MemoryRemote::new();
        remote.fail_next_create(RemoteError::PermissionDenied("rules".into()));

        assert!(matches!(
            remote.create_session(Document::new()).await,
            Err(RemoteError::PermissionDenied(_))
        ));
        assert!(remote.create_session(Document::new()).await.is_ok());
    }

    // ===========================================
    // Query and Load Tests
    // ===========================================

    #[tokio::test]
    async fn recent_query_filters_owner_and_time() {
        let remote = MemoryRemote::new();
        remote.insert(Collection::Sessions, "a", doc(json!({ "ownerId": "u1", "createdAt": 100 })));
        remote.insert(Collection::Sessions, "b", doc(json!({ "ownerId": "u1", "createdAt": 10 })));
        remote.insert(Collection::Sessions, "c", doc(json!({ "ownerId": "u2", "createdAt": 100 })));

        let found = remote
            .query_recent_sessions(&RecentSessionQuery {
                owner_id: UserId::new("u1"),
                created_since: Timestamp::from_millis(50),
            })
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, SessionId::new("a"));
    }

    #[tokio::test]
    async fn load_respects_scope() {
        let remote = MemoryRemote::new();
        remote.insert(Collection::Groups, "g1", doc(json!({ "name": "A", "updatedAt": 5 })));
        remote.insert(
            Collection::Groups,
            "g2",
            doc(json!({ "name": "B", "active": false, "updatedAt": 50 })),
        );

        let active = remote
            .load_collection(Collection::Groups, LoadScope::ActiveOnly)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0]["id"], json!("g1"));

        let recent = remote
            .load_collection(
                Collection::Groups,
                LoadScope::UpdatedSince(Timestamp::from_millis(10)),
            )
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0]["id"], json!("g2"));

        let all = remote
            .load_collection(Collection::Groups, LoadScope::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(remote.load_count(Collection::Groups), 3);
    }

    #[tokio::test]
    async fn queued_load_failures_are_consumed_in_order() {
        let remote = MemoryRemote::new();
        remote.fail_next_load(Collection::Participants, RemoteError::Backend("1".into()));
        remote.fail_next_load(Collection::Participants, RemoteError::Backend("2".into()));

        for expected in ["1", "2"] {
            let err = remote
                .load_collection(Collection::Participants, LoadScope::All)
                .await
                .unwrap_err();
            assert_eq!(err, RemoteError::Backend(expected.into()));
        }
        assert!(remote
            .load_collection(Collection::Participants, LoadScope::All)
            .await
            .is_ok());
    }

    // ===========================================
    // Change Feed Tests
    // ===========================================

    #[tokio::test]
    async fn writes_are_echoed_on_feeds() {
        let remote = MemoryRemote::new();
        let mut feed = remote.subscribe(Collection::Participants).await.unwrap();
        assert_eq!(feed.collection(), Collection::Participants);

        remote.insert(Collection::Participants, "p1", doc(json!({ "name": "Ana" })));
        remote.insert(Collection::Participants, "p1", doc(json!({ "name": "Ana B" })));
        remote.remove(Collection::Participants, "p1");

        let added = feed.recv().await.unwrap();
        assert_eq!(added.kind, FeedEventKind::Added);
        assert_eq!(added.document["id"], json!("p1"));
        assert_eq!(feed.recv().await.unwrap().kind, FeedEventKind::Modified);
        assert_eq!(feed.recv().await.unwrap().kind, FeedEventKind::Removed);
    }

    #[tokio::test]
    async fn dropped_feeds_are_pruned() {
        let remote = MemoryRemote::new();
        let feed = remote.subscribe(Collection::Groups).await.unwrap();
        assert_eq!(remote.subscriber_count(Collection::Groups), 1);

        drop(feed);
        assert_eq!(remote.subscriber_count(Collection::Groups), 0);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let remote = MemoryRemote::new();
        let handle = remote.clone();
        remote.create_session(Document::new()).await.unwrap();
        assert_eq!(handle.create_count(), 1);

        handle.reset();
        assert_eq!(remote.create_count(), 0);
    }
}
