//! Active-session manager.
//!
//! Owns the one session the user is editing. Mutations apply in memory
//! immediately; significant ones schedule a debounced flush to the remote.
//! Every successful flush is mirrored to local durable storage, and when
//! the remote is unreachable the mirror is the only write.
//!
//! At most one flush runs at a time. It executes on its own task and is
//! published as a shared future, so concurrent callers join the same write
//! and observe the same outcome. [`clear`](ActiveSessionManager::clear)
//! blocks new flushes, waits for the running one and only then wipes state.
//!
//! Internal state sits behind a `std::sync::Mutex` that is never held
//! across an await.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use sync_core::{
    adopt_remote, apply_resolution, check_transition, classify_change, detect_conflict, ChangeKind,
    ConflictCheck, DebouncePolicy, DuplicateGuard, MarkerPolicy,
};
use sync_types::{
    ActiveSession, Document, FinancialConfig, GroupId, SessionId, SessionParticipant, Timestamp,
    UserId,
};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::local::{LocalStore, SessionMirror};
use crate::network::{NetworkMonitor, NetworkState};
use crate::remote::{RecentSessionQuery, RemoteStore};
use crate::resolver::ConflictResolver;
use crate::{RemoteError, SyncError};

/// How a flush ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// The remote accepted the write; the session is bound to `id`.
    Synced {
        /// Remote id of the session.
        id: SessionId,
    },
    /// The remote was unreachable; the session was mirrored locally and
    /// stays dirty until the next flush.
    SavedLocally,
    /// Nothing to write.
    Skipped,
}

/// What the manager is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerStatus {
    /// No timer and no flush.
    Idle,
    /// A debounced flush is scheduled.
    Pending,
    /// A flush is running.
    Flushing,
}

type FlushResult = Result<FlushOutcome, SyncError>;
type SharedFlush = Shared<BoxFuture<'static, FlushResult>>;

/// Keeps the active session in memory, on the remote and in the local mirror.
///
/// Clones share the same manager.
#[derive(Clone)]
pub struct ActiveSessionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    remote: Arc<dyn RemoteStore>,
    mirror: SessionMirror,
    network: NetworkMonitor,
    clock: Arc<dyn Clock>,
    resolver: Arc<dyn ConflictResolver>,
    debounce: DebouncePolicy,
    guard: DuplicateGuard,
    legacy_proximity: Duration,
    markers: MarkerPolicy,
    state: Mutex<ManagerState>,
    changes: watch::Sender<u64>,
    reconnect: Mutex<Option<JoinHandle<()>>>,
}

#[derive(Default)]
struct ManagerState {
    session: Option<ActiveSession>,
    /// Bumped whenever the in-memory session is replaced or cleared.
    epoch: u64,
    /// Bumped by every applied mutation.
    revision: u64,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    in_flight: Option<SharedFlush>,
    clearing: bool,
    /// Set by `shutdown`; never cleared.
    closed: bool,
}

impl ManagerState {
    fn refuses_work(&self) -> bool {
        self.clearing || self.closed
    }
}

impl std::fmt::Debug for ActiveSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveSessionManager")
            .field("session", &self.current().and_then(|s| s.id))
            .field("status", &self.status())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ActiveSessionManager {
    /// Create a manager.
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
        network: NetworkMonitor,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn ConflictResolver>,
        config: &SessionConfig,
    ) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: Arc::new(ManagerInner {
                remote,
                mirror: SessionMirror::new(local),
                network,
                clock,
                resolver,
                debounce: config.debounce(),
                guard: config.duplicate_guard(),
                legacy_proximity: config.legacy_proximity(),
                markers: config.marker_policy(),
                state: Mutex::new(ManagerState::default()),
                changes,
                reconnect: Mutex::new(None),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        lock(&self.inner.state)
    }

    fn notify(&self) {
        self.inner.changes.send_modify(|n| *n = n.wrapping_add(1));
    }

    /// The local mirror this manager writes.
    pub fn mirror(&self) -> &SessionMirror {
        &self.inner.mirror
    }

    /// A copy of the in-memory session.
    pub fn current(&self) -> Option<ActiveSession> {
        self.state().session.clone()
    }

    /// Whether the in-memory session has unsynced changes.
    pub fn is_dirty(&self) -> bool {
        self.state()
            .session
            .as_ref()
            .is_some_and(ActiveSession::is_dirty)
    }

    /// Whether a flush is scheduled or running.
    pub fn status(&self) -> ManagerStatus {
        let state = self.state();
        if state.in_flight.is_some() {
            ManagerStatus::Flushing
        } else if state.timer.is_some() {
            ManagerStatus::Pending
        } else {
            ManagerStatus::Idle
        }
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// Begin a new session and schedule its first create.
    ///
    /// Fails if another non-terminal session is active.
    pub async fn start_session(
        &self,
        owner: UserId,
        group: Option<GroupId>,
        participants: Vec<SessionParticipant>,
        financials: FinancialConfig,
    ) -> Result<ActiveSession, SyncError> {
        let now = self.inner.clock.now();
        let mut session = ActiveSession::new(owner, group, now);
        session.participants = participants;
        session.financials = financials;

        {
            let mut state = self.state();
            if state.refuses_work() {
                return Err(SyncError::TearingDown);
            }
            if let Some(existing) = &state.session {
                if !existing.status.is_terminal() {
                    return Err(SyncError::Validation(
                        "a session is already active; clear or discard it first".into(),
                    ));
                }
            }
            self.install(&mut state, session.clone());
            self.schedule_flush(&mut state);
        }
        self.notify();

        tracing::info!("Started session for owner {}", session.owner_id);
        if let Err(e) = self.inner.mirror.write(&session).await {
            tracing::warn!("Failed to mirror new session: {}", e);
        }
        Ok(session)
    }

    /// Apply a mutation to the in-memory session.
    ///
    /// The session is stamped as locally modified. Significant changes
    /// (re)start the debounce timer; cosmetic ones ride along with the next
    /// significant flush.
    ///
    /// # Errors
    ///
    /// [`SyncError::NoActiveSession`] without a session,
    /// [`SyncError::Validation`] for an illegal status transition (the
    /// session is left untouched) and [`SyncError::TearingDown`] while
    /// clearing or after shutdown.
    pub fn apply_change<F>(&self, mutate: F) -> Result<ChangeKind, SyncError>
    where
        F: FnOnce(&mut ActiveSession),
    {
        let now = self.inner.clock.now();
        let kind = {
            let mut state = self.state();
            if state.refuses_work() {
                return Err(SyncError::TearingDown);
            }
            let before = state.session.clone().ok_or(SyncError::NoActiveSession)?;
            let mut after = before.clone();
            mutate(&mut after);
            check_transition(&before, &after)?;
            after.touch(now);

            let kind = classify_change(&before, &after);
            state.session = Some(after);
            state.revision += 1;
            if kind.is_significant() {
                self.schedule_flush(&mut state);
            }
            kind
        };
        self.notify();

        tracing::debug!("Applied {:?} change", kind);
        Ok(kind)
    }

    // =========================================================================
    // Flushing
    // =========================================================================

    /// (Re)start the debounce timer. Caller holds the state lock.
    fn schedule_flush(&self, state: &mut ManagerState) {
        let Some(session) = &state.session else {
            return;
        };
        let delay = self.inner.debounce.delay_for(session);

        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.timer_generation += 1;
        let generation = state.timer_generation;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No runtime to schedule a flush; waiting for an explicit flush");
            return;
        };
        let manager = self.clone();
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            manager.on_timer(generation).await;
        }));
        tracing::debug!("Flush scheduled in {:?}", delay);
    }

    async fn on_timer(&self, generation: u64) {
        let flush = {
            let mut state = self.state();
            if state.timer_generation != generation || state.refuses_work() {
                return;
            }
            state.timer = None;
            self.start_or_join(&mut state)
        };
        self.notify();

        if let Err(e) = flush.await {
            tracing::warn!("Debounced flush failed: {}", e);
        }
    }

    /// Persist the session now, superseding any pending timer.
    ///
    /// Concurrent calls join the running flush. Unreachable remotes are
    /// not an error: the session is mirrored and
    /// [`FlushOutcome::SavedLocally`] is returned.
    pub async fn flush(&self) -> Result<FlushOutcome, SyncError> {
        let flush = {
            let mut state = self.state();
            if state.refuses_work() {
                return Err(SyncError::TearingDown);
            }
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            self.start_or_join(&mut state)
        };
        self.notify();
        flush.await
    }

    /// The running flush, or a new one. Caller holds the state lock.
    fn start_or_join(&self, state: &mut ManagerState) -> SharedFlush {
        if let Some(running) = &state.in_flight {
            return running.clone();
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            let result = manager.run_flush().await;
            manager.finish_flush();
            result
        });
        let flush = async move {
            handle
                .await
                .unwrap_or_else(|e| Err(SyncError::Remote(format!("flush task failed: {e}"))))
        }
        .boxed()
        .shared();

        state.in_flight = Some(flush.clone());
        flush
    }

    fn finish_flush(&self) {
        self.state().in_flight = None;
        self.notify();
    }

    async fn run_flush(&self) -> FlushResult {
        let started_at = self.inner.clock.now();
        let (snapshot, epoch, revision) = {
            let state = self.state();
            match &state.session {
                Some(session) => (session.clone(), state.epoch, state.revision),
                None => return Ok(FlushOutcome::Skipped),
            }
        };

        if snapshot.id.is_some() && !snapshot.is_dirty() {
            return Ok(FlushOutcome::Skipped);
        }

        if self.inner.network.state() == NetworkState::Offline {
            return self.save_locally(&snapshot).await;
        }

        match self.persist_remote(&snapshot, started_at).await {
            Ok(id) => {
                let synced = self.complete_flush(epoch, revision, &id, started_at);
                if let Some(synced) = synced {
                    if let Err(e) = self.inner.mirror.write(&synced).await {
                        tracing::warn!("Synced {} but failed to mirror it: {}", id, e);
                    }
                }
                tracing::info!("Flushed session {}", id);
                Ok(FlushOutcome::Synced { id })
            }
            Err(SyncError::NetworkUnavailable) => self.save_locally(&snapshot).await,
            Err(e) => {
                tracing::error!("Flush failed: {}", e);
                if let Err(storage) = self.inner.mirror.write(&snapshot).await {
                    tracing::warn!("Failed to mirror session after flush error: {}", storage);
                }
                Err(e)
            }
        }
    }

    async fn save_locally(&self, snapshot: &ActiveSession) -> FlushResult {
        self.inner.mirror.write(snapshot).await?;
        tracing::info!("Remote unreachable; session saved locally");
        Ok(FlushOutcome::SavedLocally)
    }

    /// Write `snapshot` to the remote and return the id it lives under.
    async fn persist_remote(
        &self,
        snapshot: &ActiveSession,
        started_at: Timestamp,
    ) -> Result<SessionId, SyncError> {
        let document = snapshot.to_document()?;
        let remote = &self.inner.remote;

        let Some(id) = &snapshot.id else {
            if let Some(existing) = self.find_duplicate(snapshot, started_at).await? {
                tracing::info!("Reusing recent remote session {} instead of creating", existing);
                return self.update_or_recreate(&existing, document).await;
            }
            let created = remote.create_session(document.clone()).await?;
            return self
                .reconcile_create(snapshot, created, document, started_at)
                .await;
        };

        self.update_or_recreate(id, document).await
    }

    async fn update_or_recreate(
        &self,
        id: &SessionId,
        document: Document,
    ) -> Result<SessionId, SyncError> {
        match self.inner.remote.update_session(id, document.clone()).await {
            Ok(()) => Ok(id.clone()),
            Err(RemoteError::NotFound { .. }) => {
                tracing::warn!("Remote session {} is gone; recreating", id);
                let created = self.inner.remote.create_session(document).await?;
                tracing::info!("Recreated session {} as {}", id, created);
                Ok(created)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A recent remote session that looks like `snapshot`, if any.
    async fn find_duplicate(
        &self,
        snapshot: &ActiveSession,
        now: Timestamp,
    ) -> Result<Option<SessionId>, SyncError> {
        let candidates = match self.recent_sessions(snapshot, now).await {
            Ok(candidates) => candidates,
            Err(e @ RemoteError::Unavailable(_)) => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Duplicate check failed, creating anyway: {}", e);
                return Ok(None);
            }
        };

        Ok(self
            .inner
            .guard
            .find(snapshot, &candidates, now)
            .and_then(|s| s.id.clone()))
    }

    /// Collapse a just-created document onto the copy every device keeps.
    ///
    /// If another device created the same session concurrently and its copy
    /// survives, ours is deleted and the write goes to the survivor.
    async fn reconcile_create(
        &self,
        snapshot: &ActiveSession,
        created: SessionId,
        document: Document,
        now: Timestamp,
    ) -> Result<SessionId, SyncError> {
        let candidates = match self.recent_sessions(snapshot, now).await {
            Ok(candidates) => candidates,
            Err(e) => {
                tracing::warn!("Could not recheck {} for concurrent creates: {}", created, e);
                return Ok(created);
            }
        };

        let guard = &self.inner.guard;
        let ours_matches = candidates
            .iter()
            .any(|c| c.id.as_ref() == Some(&created) && guard.is_duplicate(snapshot, c, now));
        if !ours_matches {
            return Ok(created);
        }
        let Some(survivor) = guard
            .survivor(snapshot, &candidates, now)
            .and_then(|s| s.id.clone())
        else {
            return Ok(created);
        };
        if survivor == created {
            return Ok(created);
        }

        tracing::info!("Session {} duplicates {}; keeping the earlier copy", created, survivor);
        if let Err(e) = self.inner.remote.delete_session(&created).await {
            tracing::warn!("Failed to delete duplicate session {}: {}", created, e);
        }
        self.update_or_recreate(&survivor, document).await
    }

    /// Readable remote sessions of the same owner created inside the guard window.
    async fn recent_sessions(
        &self,
        snapshot: &ActiveSession,
        now: Timestamp,
    ) -> Result<Vec<ActiveSession>, RemoteError> {
        let query = RecentSessionQuery {
            owner_id: snapshot.owner_id.clone(),
            created_since: self.inner.guard.since(now),
        };
        let found = self.inner.remote.query_recent_sessions(&query).await?;

        Ok(found
            .into_iter()
            .filter_map(|(id, document)| match ActiveSession::from_document(&id, document) {
                Ok(session) => Some(session),
                Err(e) => {
                    tracing::debug!("Skipping unreadable session {}: {}", id, e);
                    None
                }
            })
            .collect())
    }

    /// Bind the flushed session to `id` and mark it synced at the flush start.
    ///
    /// Returns `None` if the session was replaced or cleared meanwhile.
    fn complete_flush(
        &self,
        epoch: u64,
        revision: u64,
        id: &SessionId,
        synced_at: Timestamp,
    ) -> Option<ActiveSession> {
        let mut state = self.state();
        if state.epoch != epoch {
            tracing::debug!("Session replaced during flush; result not applied");
            return None;
        }
        let changed_meanwhile = state.revision != revision;
        let session = state.session.as_mut()?;
        session.id = Some(id.clone());
        session.mark_synced(synced_at);
        if changed_meanwhile {
            let floor = synced_at.saturating_add(Duration::from_millis(1));
            let modified = session.local_modified_at.unwrap_or_default().max(floor);
            session.local_modified_at = Some(modified);
        }
        Some(session.clone())
    }

    /// Wait until no flush is running and no timer is pending.
    pub async fn wait_for_pending_persist(&self) {
        let mut changes = self.inner.changes.subscribe();
        loop {
            let (running, pending) = {
                let state = self.state();
                (state.in_flight.clone(), state.timer.is_some())
            };
            if let Some(flush) = running {
                let _ = flush.await;
                continue;
            }
            if !pending {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    // =========================================================================
    // Loading
    // =========================================================================

    fn install(&self, state: &mut ManagerState, session: ActiveSession) {
        state.session = Some(session);
        state.epoch += 1;
    }

    /// Load a session by id.
    ///
    /// The remote copy wins unless the in-memory copy of the same session
    /// has unsynced changes, in which case conflict detection decides and
    /// the resolver is asked at most once. When the remote cannot be read
    /// the local mirror is used instead.
    pub async fn load(&self, id: &SessionId) -> Result<ActiveSession, SyncError> {
        if self.state().refuses_work() {
            return Err(SyncError::TearingDown);
        }

        let remote = match self.fetch_remote(id).await {
            Ok(remote) => remote,
            Err(e) => return self.load_local(id, e).await,
        };

        let now = self.inner.clock.now();
        let local = self
            .current()
            .filter(|s| s.id.as_ref() == Some(id));

        let resolved = match local {
            None => adopt_remote(None, &remote, now),
            Some(local) => match detect_conflict(&local, &remote, self.inner.legacy_proximity) {
                ConflictCheck::AdoptRemote => adopt_remote(Some(&local), &remote, now),
                ConflictCheck::KeepLocal => {
                    tracing::debug!("Keeping local changes of {}", id);
                    local
                }
                ConflictCheck::Conflict => {
                    let resolution = self.inner.resolver.resolve(&local, &remote).await;
                    tracing::info!("Conflict on {} resolved with {:?}", id, resolution);
                    apply_resolution(&local, &remote, resolution, now)
                }
            },
        };

        self.adopt(resolved).await
    }

    async fn fetch_remote(&self, id: &SessionId) -> Result<ActiveSession, SyncError> {
        if self.inner.network.state() == NetworkState::Offline {
            return Err(SyncError::NetworkUnavailable);
        }
        let document = self.inner.remote.get_session(id).await?;
        Ok(ActiveSession::from_document(id, document)?)
    }

    /// Fall back to the in-memory copy or the mirror after a failed remote read.
    async fn load_local(&self, id: &SessionId, cause: SyncError) -> Result<ActiveSession, SyncError> {
        tracing::warn!("Loading {} from local storage: {}", id, cause);

        if let Some(session) = self.current().filter(|s| s.id.as_ref() == Some(id)) {
            return Ok(session);
        }
        match self.inner.mirror.snapshot_for(id).await? {
            Some(snapshot) => self.adopt(snapshot).await,
            None => Err(cause),
        }
    }

    /// Make `session` the in-memory session and mirror it.
    async fn adopt(&self, session: ActiveSession) -> Result<ActiveSession, SyncError> {
        {
            let mut state = self.state();
            if state.refuses_work() {
                return Err(SyncError::TearingDown);
            }
            self.install(&mut state, session.clone());
            if session.is_dirty() {
                self.schedule_flush(&mut state);
            }
        }
        self.notify();

        if let Err(e) = self.inner.mirror.write(&session).await {
            tracing::warn!("Failed to mirror loaded session: {}", e);
        }
        Ok(session)
    }

    /// Bring back the session mirrored by a previous run.
    ///
    /// A snapshot whose id carries a handled-deleted marker was discarded
    /// on this device and is dropped instead. Without a snapshot, a stored
    /// pointer is loaded from the remote.
    pub async fn restore(&self) -> Result<Option<ActiveSession>, SyncError> {
        if self.state().closed {
            return Err(SyncError::TearingDown);
        }
        if let Some(current) = self.current() {
            return Ok(Some(current));
        }

        let mirror = &self.inner.mirror;
        let snapshot = match mirror.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("Ignoring unreadable session snapshot: {}", e);
                None
            }
        };

        if let Some(id) = snapshot.as_ref().and_then(|s| s.id.clone()) {
            if mirror.is_handled(&id).await? {
                tracing::info!("Session {} was discarded here; not restoring", id);
                mirror.clear().await?;
                return Ok(None);
            }
        }

        if let Some(snapshot) = snapshot {
            tracing::info!("Restoring session {:?} from local storage", snapshot.id);
            return self.adopt(snapshot).await.map(Some);
        }

        let Some(id) = mirror.pointer().await? else {
            return Ok(None);
        };
        if mirror.is_handled(&id).await? {
            return Ok(None);
        }
        match self.load(&id).await {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                tracing::warn!("Could not restore session {}: {}", id, e);
                Ok(None)
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Stop the timer, block new flushes and wait for the running one.
    async fn quiesce(&self) {
        let running = {
            let mut state = self.state();
            state.clearing = true;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            state.in_flight.clone()
        };
        self.notify();

        if let Some(flush) = running {
            if let Err(e) = flush.await {
                tracing::warn!("Flush running at teardown failed: {}", e);
            }
        }
    }

    fn take_session(&self) -> Option<ActiveSession> {
        let mut state = self.state();
        state.epoch += 1;
        state.session.take()
    }

    fn finish_clearing(&self) {
        self.state().clearing = false;
        self.notify();
    }

    /// Drop the active session from memory and local storage.
    ///
    /// Waits for a running flush first; no flush starts while clearing.
    /// Also removes the handled-deleted marker of the session.
    pub async fn clear(&self) -> Result<(), SyncError> {
        self.quiesce().await;
        let id = self.take_session().and_then(|s| s.id);

        let result = self.wipe_local(id.as_ref(), true).await;
        self.finish_clearing();
        tracing::info!("Cleared active session {:?}", id);
        result
    }

    /// Delete the active session everywhere and remember that this device
    /// handled the delete, so a stale local copy is never restored.
    pub async fn discard(&self) -> Result<(), SyncError> {
        if self.state().closed {
            return Err(SyncError::TearingDown);
        }
        self.quiesce().await;
        let id = self.take_session().and_then(|s| s.id);

        let result = self.forget(id.as_ref()).await;
        self.finish_clearing();
        tracing::info!("Discarded active session {:?}", id);
        result
    }

    async fn forget(&self, id: Option<&SessionId>) -> Result<(), SyncError> {
        if let Some(id) = id {
            self.delete_remote(id).await;
            let mirror = &self.inner.mirror;
            mirror.mark_handled(id, self.inner.clock.now()).await?;
            let removed = mirror.collect_markers(self.inner.markers).await?;
            if removed > 0 {
                tracing::debug!("Collected {} handled-deleted markers", removed);
            }
        }
        self.wipe_local(id, false).await
    }

    async fn delete_remote(&self, id: &SessionId) {
        if self.inner.network.state() == NetworkState::Offline {
            tracing::warn!("Offline; remote session {} left in place", id);
            return;
        }
        if let Err(e) = self.inner.remote.delete_session(id).await {
            tracing::warn!("Failed to delete remote session {}: {}", id, e);
        }
    }

    async fn wipe_local(&self, id: Option<&SessionId>, unmark: bool) -> Result<(), SyncError> {
        self.inner.mirror.clear().await?;
        if let (true, Some(id)) = (unmark, id) {
            self.inner.mirror.unmark_handled(id).await?;
        }
        Ok(())
    }

    // =========================================================================
    // Reconnect
    // =========================================================================

    /// Flush unsynced changes whenever the network comes back.
    ///
    /// Calling it again replaces the previous watcher.
    pub fn start_reconnect_flush(&self) {
        if self.state().closed {
            tracing::debug!("Manager shut down; not watching the network");
            return;
        }
        let mut rx = self.inner.network.subscribe();
        let mut previous = *rx.borrow_and_update();
        let manager = self.clone();
        let handle = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let state = *rx.borrow_and_update();
                let reconnected = state == NetworkState::Online && previous != NetworkState::Online;
                previous = state;
                if !reconnected || !manager.is_dirty() {
                    continue;
                }
                tracing::info!("Back online with unsynced changes; flushing");
                match manager.flush().await {
                    Ok(outcome) => tracing::debug!("Reconnect flush: {:?}", outcome),
                    Err(e) => tracing::warn!("Reconnect flush failed: {}", e),
                }
            }
        });

        if let Some(old) = lock(&self.inner.reconnect).replace(handle) {
            old.abort();
        }
    }

    /// Stop background work started by this manager and refuse new work.
    ///
    /// The pending timer is cancelled; a running flush completes on its own.
    /// Afterwards every operation except [`clear`](Self::clear) fails with
    /// [`SyncError::TearingDown`].
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.inner.reconnect).take() {
            handle.abort();
        }
        let timer = {
            let mut state = self.state();
            state.closed = true;
            state.timer.take()
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        self.notify();
    }
}
