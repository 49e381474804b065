//! Realtime cache store.
//!
//! A process-wide, in-memory `collection -> id -> record` store for the
//! reference and historical collections. Reads are synchronous. Writes go
//! through [`RealtimeCache::upsert`], which deep-compares each record and
//! only counts real changes.
//!
//! # Notification batching
//!
//! Changed ids collect in a [`PendingChanges`] set. The first upsert of a
//! tick schedules one flush task on the current Tokio runtime; every other
//! upsert in the same tick just adds to the set. When the task runs it fires
//! one notification per affected collection carrying the current snapshot,
//! so three upserts of the same record yield one callback with the final
//! value. Outside a runtime the flush runs inline.
//!
//! Callbacks run outside the cache lock and may read from the cache.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::task::AbortHandle;

use sync_core::{FreshnessWindow, PendingChanges};
use sync_types::{record_id, Collection, CollectionRecord, Document, SchemaError, Timestamp};

use crate::clock::Clock;

/// A cached record and when it last changed.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheRecord {
    /// The document, dates normalized, `id` included.
    pub value: Document,
    /// Time of the last upsert that changed it.
    pub last_updated_at: Timestamp,
}

/// Subscriber callback. Receives the (optionally id-filtered) snapshot.
pub type CacheCallback = Arc<dyn Fn(Vec<Document>) + Send + Sync>;

/// Thread-safe realtime cache.
///
/// Clones share the same store.
#[derive(Clone)]
pub struct RealtimeCache {
    shared: Arc<CacheShared>,
}

struct CacheShared {
    state: Mutex<CacheState>,
    clock: Arc<dyn Clock>,
    freshness: FreshnessWindow,
}

#[derive(Default)]
struct CacheState {
    collections: HashMap<Collection, CollectionEntry>,
    pending: PendingChanges,
    subscribers: HashMap<Collection, Vec<Subscriber>>,
    next_subscriber: u64,
    feeds: Vec<AbortHandle>,
}

#[derive(Default)]
struct CollectionEntry {
    records: BTreeMap<String, CacheRecord>,
    last_updated_at: Option<Timestamp>,
}

struct Subscriber {
    id: u64,
    ids: Option<HashSet<String>>,
    callback: CacheCallback,
}

impl Subscriber {
    fn snapshot(&self, entry: Option<&CollectionEntry>) -> Vec<Document> {
        let Some(entry) = entry else {
            return Vec::new();
        };
        entry
            .records
            .iter()
            .filter(|(id, _)| self.ids.as_ref().map_or(true, |ids| ids.contains(*id)))
            .map(|(_, record)| record.value.clone())
            .collect()
    }

    fn wants(&self, changed: &HashSet<String>) -> bool {
        match &self.ids {
            Some(ids) => !ids.is_disjoint(changed),
            None => true,
        }
    }
}

impl std::fmt::Debug for RealtimeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("RealtimeCache")
            .field("collections", &state.collections.len())
            .field("pending", &state.pending.len())
            .field("feeds", &state.feeds.len())
            .finish()
    }
}

impl RealtimeCache {
    /// Create an empty cache.
    pub fn new(clock: Arc<dyn Clock>, freshness: FreshnessWindow) -> Self {
        Self {
            shared: Arc::new(CacheShared {
                state: Mutex::new(CacheState::default()),
                clock,
                freshness,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ===========================================
    // Reads
    // ===========================================

    /// Document with the given id.
    pub fn get(&self, collection: Collection, id: &str) -> Option<Document> {
        self.record(collection, id).map(|r| r.value)
    }

    /// Record (value plus change time) with the given id.
    pub fn record(&self, collection: Collection, id: &str) -> Option<CacheRecord> {
        self.lock()
            .collections
            .get(&collection)
            .and_then(|entry| entry.records.get(id).cloned())
    }

    /// First document (by id order) matching `filter`.
    pub fn find<F>(&self, collection: Collection, filter: F) -> Option<Document>
    where
        F: Fn(&Document) -> bool,
    {
        self.lock().collections.get(&collection).and_then(|entry| {
            entry
                .records
                .values()
                .find(|r| filter(&r.value))
                .map(|r| r.value.clone())
        })
    }

    /// Every document in a collection, ordered by id.
    pub fn get_all(&self, collection: Collection) -> Vec<Document> {
        self.get_all_where(collection, |_| true)
    }

    /// Every document matching `predicate`, ordered by id.
    pub fn get_all_where<F>(&self, collection: Collection, predicate: F) -> Vec<Document>
    where
        F: Fn(&Document) -> bool,
    {
        self.lock()
            .collections
            .get(&collection)
            .map(|entry| {
                entry
                    .records
                    .values()
                    .filter(|r| predicate(&r.value))
                    .map(|r| r.value.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Typed read of one record.
    pub fn get_as<T: CollectionRecord>(&self, id: &str) -> Result<Option<T>, SchemaError> {
        self.get(T::COLLECTION, id).map(decode::<T>).transpose()
    }

    /// Typed read of a whole collection.
    pub fn get_all_as<T: CollectionRecord>(&self) -> Result<Vec<T>, SchemaError> {
        self.get_all(T::COLLECTION).into_iter().map(decode::<T>).collect()
    }

    /// Number of records in a collection.
    pub fn len(&self, collection: Collection) -> usize {
        self.lock()
            .collections
            .get(&collection)
            .map_or(0, |entry| entry.records.len())
    }

    /// Whether a collection holds no records.
    pub fn is_empty(&self, collection: Collection) -> bool {
        self.len(collection) == 0
    }

    /// Last time a collection changed or was confirmed by a load.
    pub fn last_updated_at(&self, collection: Collection) -> Option<Timestamp> {
        self.lock()
            .collections
            .get(&collection)
            .and_then(|entry| entry.last_updated_at)
    }

    /// Non-empty and inside the freshness window.
    pub fn is_fresh(&self, collection: Collection) -> bool {
        let (last, len) = {
            let state = self.lock();
            state
                .collections
                .get(&collection)
                .map_or((None, 0), |e| (e.last_updated_at, e.records.len()))
        };
        self.shared
            .freshness
            .is_fresh(last, len, self.shared.clock.now())
    }

    /// Empty, never loaded, or outside the freshness window.
    pub fn needs_refresh(&self, collection: Collection) -> bool {
        !self.is_fresh(collection)
    }

    /// Freshness window in use.
    pub fn freshness(&self) -> FreshnessWindow {
        self.shared.freshness
    }

    // ===========================================
    // Writes
    // ===========================================

    /// Merge one document. See [`upsert_many`](Self::upsert_many).
    pub fn upsert(&self, collection: Collection, document: Document) -> usize {
        self.upsert_many(collection, std::iter::once(document))
    }

    /// Merge documents into a collection; returns how many changed.
    ///
    /// A document without a string `id` is skipped. Equal documents (key
    /// order does not matter) are not replaced and not notified. A flush is
    /// scheduled in every case, at most once per tick.
    pub fn upsert_many<I>(&self, collection: Collection, documents: I) -> usize
    where
        I: IntoIterator<Item = Document>,
    {
        let now = self.shared.clock.now();
        let mut changed = 0;
        {
            let mut state = self.lock();
            let CacheState {
                collections,
                pending,
                ..
            } = &mut *state;
            let entry = collections.entry(collection).or_default();

            for document in documents {
                let Some(id) = record_id(&document).map(str::to_owned) else {
                    tracing::warn!("Cache: skipping {} record without id", collection);
                    continue;
                };
                if entry.records.get(&id).is_some_and(|r| r.value == document) {
                    continue;
                }
                entry.records.insert(
                    id.clone(),
                    CacheRecord {
                        value: document,
                        last_updated_at: now,
                    },
                );
                entry.last_updated_at = Some(now);
                pending.mark(collection, id);
                changed += 1;
            }
        }

        if changed > 0 {
            tracing::debug!("Cache: {} changed record(s) in {}", changed, collection);
        }
        self.schedule_flush();
        changed
    }

    /// Stamp a collection as confirmed current without changing records.
    ///
    /// Called after a successful load that returned nothing new.
    pub fn touch(&self, collection: Collection) {
        let now = self.shared.clock.now();
        self.lock()
            .collections
            .entry(collection)
            .or_default()
            .last_updated_at = Some(now);
    }

    fn schedule_flush(&self) {
        if !self.lock().pending.request_flush() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let cache = self.clone();
                handle.spawn(async move {
                    cache.flush_pending();
                });
            }
            Err(_) => self.flush_pending(),
        }
    }

    /// Fire one notification per collection with pending changes.
    ///
    /// Normally run by the scheduled task; callable directly to flush early.
    pub fn flush_pending(&self) {
        let deliveries: Vec<(CacheCallback, Vec<Document>)> = {
            let mut state = self.lock();
            let drained = state.pending.drain();
            let mut deliveries = Vec::new();
            for (collection, changed) in drained {
                tracing::debug!(
                    "Cache: notifying {} ({} changed id(s))",
                    collection,
                    changed.len()
                );
                let entry = state.collections.get(&collection);
                if let Some(subscribers) = state.subscribers.get(&collection) {
                    for subscriber in subscribers.iter().filter(|s| s.wants(&changed)) {
                        deliveries.push((subscriber.callback.clone(), subscriber.snapshot(entry)));
                    }
                }
            }
            deliveries
        };

        for (callback, snapshot) in deliveries {
            callback(snapshot);
        }
    }

    // ===========================================
    // Subscriptions
    // ===========================================

    /// Register `callback` for a collection's notifications.
    ///
    /// With `ids`, the callback sees only those records and only fires when
    /// one of them changed.
    pub fn subscribe<F>(
        &self,
        collection: Collection,
        ids: Option<Vec<String>>,
        callback: F,
    ) -> SubscriptionHandle
    where
        F: Fn(Vec<Document>) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        state.next_subscriber += 1;
        let id = state.next_subscriber;
        state
            .subscribers
            .entry(collection)
            .or_default()
            .push(Subscriber {
                id,
                ids: ids.map(|ids| ids.into_iter().collect()),
                callback: Arc::new(callback),
            });

        SubscriptionHandle {
            cache: Arc::downgrade(&self.shared),
            collection,
            id,
        }
    }

    /// Number of registered callbacks on a collection.
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.lock()
            .subscribers
            .get(&collection)
            .map_or(0, Vec::len)
    }

    /// Track a realtime feed task so [`reset`](Self::reset) can detach it.
    pub fn track_feed(&self, handle: AbortHandle) {
        self.lock().feeds.push(handle);
    }

    /// Abort every tracked feed task; returns how many were tracked.
    pub fn detach_feeds(&self) -> usize {
        let feeds = std::mem::take(&mut self.lock().feeds);
        for feed in &feeds {
            feed.abort();
        }
        feeds.len()
    }

    /// Number of tracked feed tasks.
    pub fn feed_count(&self) -> usize {
        self.lock().feeds.len()
    }

    /// Clear every collection, detach tracked feeds and notify every
    /// subscriber of the empty state.
    pub fn reset(&self) {
        let detached = self.detach_feeds();
        let deliveries: Vec<CacheCallback> = {
            let mut state = self.lock();
            state.collections.clear();
            state.pending.clear();
            state
                .subscribers
                .values()
                .flat_map(|subs| subs.iter().map(|s| s.callback.clone()))
                .collect()
        };

        tracing::info!(
            "Cache: reset ({} feed(s) detached, {} subscriber(s) notified)",
            detached,
            deliveries.len()
        );
        for callback in deliveries {
            callback(Vec::new());
        }
    }
}

fn decode<T: CollectionRecord>(document: Document) -> Result<T, SchemaError> {
    serde_json::from_value(Value::Object(document)).map_err(SchemaError::Deserialization)
}

/// Handle returned by [`RealtimeCache::subscribe`].
///
/// Dropping the handle keeps the subscription; call
/// [`unsubscribe`](Self::unsubscribe) to end it.
#[must_use = "dropping the handle keeps the subscription alive; call unsubscribe() to end it"]
#[derive(Debug)]
pub struct SubscriptionHandle {
    cache: Weak<CacheShared>,
    collection: Collection,
    id: u64,
}

impl SubscriptionHandle {
    /// Remove the callback. A no-op if the cache is gone.
    pub fn unsubscribe(self) {
        let Some(shared) = self.cache.upgrade() else {
            return;
        };
        let mut state = shared.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(subscribers) = state.subscribers.get_mut(&self.collection) {
            subscribers.retain(|s| s.id != self.id);
        }
    }
}
