//! Subscription/sync orchestrator.
//!
//! Bootstraps the [`RealtimeCache`] and keeps it live:
//!
//! 1. [`initialize`](SyncOrchestrator::initialize) loads in three priority
//!    waves: active reference records, recent session history, then a full
//!    backfill. Only the first wave is retried (fixed delay, bounded).
//! 2. [`attach_realtime_subscriptions`](SyncOrchestrator::attach_realtime_subscriptions)
//!    opens one change feed per collection and upserts every add/modify
//!    event. Deletes are logged and ignored.
//! 3. [`start_network_listener`](SyncOrchestrator::start_network_listener)
//!    refreshes stale collections on reconnect, behind a cool-down.
//!
//! Per-collection load status is tracked in a `DashMap` so readers never
//! contend with the loaders.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use serde_json::Value;
use tokio::task::JoinHandle;

use sync_core::{
    LoadEvent, LoadPhase, LoadStatus, NetworkState, Reachability, ReachabilityAction,
    ReachabilityEvent,
};
use sync_types::{normalize_dates, Collection, Document};

use crate::cache::RealtimeCache;
use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::network::NetworkMonitor;
use crate::remote::{ChangeFeed, FeedEventKind, LoadScope, RemoteStore};
use crate::SyncError;

/// Keeps the realtime cache loaded and live.
///
/// Clones share the same orchestrator.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    cache: RealtimeCache,
    remote: Arc<dyn RemoteStore>,
    network: NetworkMonitor,
    clock: Arc<dyn Clock>,
    config: OrchestratorConfig,
    statuses: DashMap<Collection, LoadStatus>,
    reachability: Mutex<Reachability>,
    listener: Mutex<Option<JoinHandle<()>>>,
    retry: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("cache", &self.inner.cache)
            .field("network", &self.inner.network.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Normalize remote dates in a document received from the remote.
fn normalized(document: Document) -> Document {
    let mut value = Value::Object(document);
    normalize_dates(&mut value);
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

impl SyncOrchestrator {
    /// Create an orchestrator over a cache and remote.
    pub fn new(
        cache: RealtimeCache,
        remote: Arc<dyn RemoteStore>,
        network: NetworkMonitor,
        clock: Arc<dyn Clock>,
        config: OrchestratorConfig,
    ) -> Self {
        let reachability = Reachability::new(config.reconnect_cooldown());
        Self {
            inner: Arc::new(OrchestratorInner {
                cache,
                remote,
                network,
                clock,
                config,
                statuses: DashMap::new(),
                reachability: Mutex::new(reachability),
                listener: Mutex::new(None),
                retry: Mutex::new(None),
            }),
        }
    }

    /// The cache this orchestrator feeds.
    pub fn cache(&self) -> &RealtimeCache {
        &self.inner.cache
    }

    /// Load status of a collection, with freshness resolved.
    pub fn load_status(&self, collection: Collection) -> LoadPhase {
        let status = self
            .inner
            .statuses
            .get(&collection)
            .map(|s| s.clone())
            .unwrap_or_default();
        status.phase(self.inner.cache.freshness(), self.inner.clock.now())
    }

    fn record(&self, collection: Collection, event: LoadEvent) {
        let mut status = self.inner.statuses.entry(collection).or_default();
        let current = std::mem::take(&mut *status);
        *status = current.on_event(event);
    }

    fn reachability_event(&self, event: ReachabilityEvent) -> Vec<ReachabilityAction> {
        let mut tracker = lock(&self.inner.reachability);
        let (next, actions) = tracker.clone().on_event(event);
        *tracker = next;
        actions
    }

    /// Load one collection into the cache; returns how many records changed.
    async fn load_into(&self, collection: Collection, scope: LoadScope) -> Result<usize, SyncError> {
        self.record(collection, LoadEvent::Started);

        match self.inner.remote.load_collection(collection, scope).await {
            Ok(documents) => {
                let fetched = documents.len();
                let changed = self
                    .inner
                    .cache
                    .upsert_many(collection, documents.into_iter().map(normalized));
                self.inner.cache.touch(collection);

                let at = self.inner.clock.now();
                self.record(collection, LoadEvent::Succeeded { at });
                self.reachability_event(ReachabilityEvent::SyncCompleted { at });
                tracing::info!(
                    "Loaded {} ({:?}): {} fetched, {} changed",
                    collection,
                    scope,
                    fetched,
                    changed
                );
                Ok(changed)
            }
            Err(e) => {
                tracing::warn!("Load of {} ({:?}) failed: {}", collection, scope, e);
                self.record(
                    collection,
                    LoadEvent::Failed {
                        message: e.to_string(),
                    },
                );
                Err(e.into())
            }
        }
    }

    // ===========================================
    // Initial Load
    // ===========================================

    /// Run the three load waves.
    ///
    /// Wave 1 failures schedule a bounded fixed-delay retry in the
    /// background. Wave 2 and 3 failures are logged and left for the next
    /// refresh. Never fails.
    pub async fn initialize(&self) {
        // Wave 1: small reference collections, active records only.
        let mut failed = Vec::new();
        for collection in Collection::REFERENCE {
            if self
                .load_into(collection, LoadScope::ActiveOnly)
                .await
                .is_err()
            {
                failed.push(collection);
            }
        }
        if !failed.is_empty() {
            self.schedule_retry(failed);
        }

        // Wave 2: recent session history.
        let since = self
            .inner
            .clock
            .now()
            .saturating_sub(self.inner.config.history_window());
        if let Err(e) = self
            .load_into(Collection::Sessions, LoadScope::UpdatedSince(since))
            .await
        {
            tracing::warn!("History wave failed, waiting for next refresh: {}", e);
        }

        // Wave 3: full backfill, inactive and historical included.
        for collection in Collection::ALL {
            if let Err(e) = self.load_into(collection, LoadScope::All).await {
                tracing::warn!(
                    "Backfill of {} failed, waiting for next refresh: {}",
                    collection,
                    e
                );
            }
        }
    }

    fn schedule_retry(&self, collections: Vec<Collection>) {
        let orchestrator = self.clone();
        let delay = self.inner.config.retry_delay();
        let max_retries = self.inner.config.max_retries;
        tracing::warn!(
            "Reference wave failed for {:?}, retrying every {}s (max {})",
            collections,
            delay.as_secs(),
            max_retries
        );

        let handle = tokio::spawn(async move {
            let mut remaining = collections;
            for attempt in 1..=max_retries {
                tokio::time::sleep(delay).await;

                let mut still_failed = Vec::new();
                for collection in remaining {
                    if orchestrator
                        .load_into(collection, LoadScope::ActiveOnly)
                        .await
                        .is_err()
                    {
                        still_failed.push(collection);
                    }
                }
                remaining = still_failed;

                if remaining.is_empty() {
                    tracing::info!("Reference wave recovered on retry {}", attempt);
                    return;
                }
            }
            tracing::error!(
                "Reference wave gave up after {} retries: {:?}",
                max_retries,
                remaining
            );
        });

        if let Some(previous) = lock(&self.inner.retry).replace(handle) {
            previous.abort();
        }
    }

    // ===========================================
    // Realtime Feeds
    // ===========================================

    /// Open one change feed per collection; returns how many were attached.
    ///
    /// A no-op while feeds are already attached. A collection whose feed
    /// cannot be opened is logged and skipped.
    pub async fn attach_realtime_subscriptions(&self) -> usize {
        if self.inner.cache.feed_count() > 0 {
            tracing::debug!("Realtime feeds already attached");
            return 0;
        }

        let mut attached = 0;
        for collection in Collection::ALL {
            match self.inner.remote.subscribe(collection).await {
                Ok(feed) => {
                    let handle = tokio::spawn(run_feed(self.inner.cache.clone(), feed));
                    self.inner.cache.track_feed(handle.abort_handle());
                    attached += 1;
                }
                Err(e) => {
                    tracing::warn!("Could not attach realtime feed for {}: {}", collection, e);
                }
            }
        }
        tracing::info!("Attached {} realtime feed(s)", attached);
        attached
    }

    // ===========================================
    // Reachability
    // ===========================================

    /// Watch the network monitor and refresh stale collections on reconnect.
    ///
    /// A no-op if the listener is already running.
    pub fn start_network_listener(&self) {
        let mut slot = lock(&self.inner.listener);
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        let mut rx = self.inner.network.subscribe();
        let initial = *rx.borrow_and_update();
        self.reachability_event(ReachabilityEvent::StateChanged {
            state: initial,
            at: self.inner.clock.now(),
        });

        let orchestrator = self.clone();
        *slot = Some(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                let actions = orchestrator.reachability_event(ReachabilityEvent::StateChanged {
                    state,
                    at: orchestrator.inner.clock.now(),
                });
                for action in actions {
                    match action {
                        ReachabilityAction::RefreshStale => {
                            orchestrator.refresh_stale().await;
                        }
                        ReachabilityAction::CooldownActive { remaining } => {
                            tracing::debug!(
                                "Reconnected inside cool-down ({}s left), not refreshing",
                                remaining.as_secs()
                            );
                        }
                    }
                }
            }
            tracing::debug!("Network listener stopped");
        }));
    }

    /// Refresh every collection that is stale or empty.
    async fn refresh_stale(&self) {
        for collection in Collection::ALL {
            if self.inner.cache.needs_refresh(collection) {
                tracing::info!("Reconnect refresh of stale {}", collection);
                let _ = self.refresh_one(collection).await;
            }
        }
    }

    // ===========================================
    // Explicit Refresh
    // ===========================================

    fn ensure_online(&self) -> Result<(), SyncError> {
        if self.inner.network.state() == NetworkState::Offline {
            return Err(SyncError::NetworkUnavailable);
        }
        Ok(())
    }

    /// Reload every collection, ignoring freshness.
    ///
    /// Fails fast with [`SyncError::NetworkUnavailable`] when offline.
    /// Otherwise every collection is attempted and the first failure is
    /// returned.
    pub async fn force_refresh(&self) -> Result<(), SyncError> {
        self.ensure_online()?;
        let mut first_error = None;
        for collection in Collection::ALL {
            if let Err(e) = self.load_into(collection, LoadScope::All).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reload one collection, ignoring freshness.
    pub async fn refresh_one(&self, collection: Collection) -> Result<usize, SyncError> {
        self.ensure_online()?;
        self.load_into(collection, LoadScope::All).await
    }

    // ===========================================
    // Cleanup
    // ===========================================

    /// Stop the listener and retry task, detach feeds and reset the cache.
    pub fn cleanup(&self) {
        if let Some(listener) = lock(&self.inner.listener).take() {
            listener.abort();
        }
        if let Some(retry) = lock(&self.inner.retry).take() {
            retry.abort();
        }
        self.inner.statuses.clear();
        self.inner.cache.reset();
        tracing::info!("Orchestrator cleaned up");
    }
}

async fn run_feed(cache: RealtimeCache, mut feed: ChangeFeed) {
    let collection = feed.collection();
    tracing::debug!("Realtime feed for {} running", collection);

    while let Some(event) = feed.recv().await {
        match event.kind {
            FeedEventKind::Added | FeedEventKind::Modified => {
                let mut document = normalized(event.document);
                document
                    .entry("id")
                    .or_insert_with(|| Value::String(event.id.clone()));
                cache.upsert(collection, document);
            }
            FeedEventKind::Removed => {
                tracing::debug!(
                    "Ignoring realtime delete of {}/{}; deletes go through discard",
                    collection,
                    event.id
                );
            }
        }
    }
    tracing::info!("Realtime feed for {} closed by remote", collection);
}
