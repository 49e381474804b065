//! End-to-end sync scenarios.
//!
//! Every scenario runs against the in-memory remote and local stores with a
//! paused Tokio clock, so debounce and retry timing is deterministic.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kitty_sync_client::{
    ActiveSessionManager, Clock, Config, FixedResolver, FlushOutcome, ManualClock,
    MemoryLocalStore, MemoryRemote, NetworkMonitor, NetworkState, RealtimeCache, Resolution,
    SessionConfig, SyncContext, SyncError,
};
use serde_json::json;
use sync_core::{FreshnessWindow, LoadPhase};
use sync_types::{
    ActiveSession, Collection, Document, FinancialConfig, GroupId, SessionId, SessionParticipant,
    Timestamp, UserId,
};

const NOW: u64 = 50 * 24 * 60 * 60 * 1000;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn doc(value: serde_json::Value) -> Document {
    value.as_object().cloned().unwrap()
}

struct Device {
    manager: ActiveSessionManager,
    local: MemoryLocalStore,
    network: NetworkMonitor,
    clock: ManualClock,
    resolver: Arc<FixedResolver>,
}

fn device(remote: &MemoryRemote, resolution: Resolution) -> Device {
    let local = MemoryLocalStore::new();
    let network = NetworkMonitor::new(NetworkState::Online);
    let clock = ManualClock::new(Timestamp::from_millis(NOW));
    let resolver = Arc::new(FixedResolver::new(resolution));
    let manager = ActiveSessionManager::new(
        Arc::new(remote.clone()),
        Arc::new(local.clone()),
        network.clone(),
        Arc::new(clock.clone()),
        resolver.clone(),
        &SessionConfig::default(),
    );
    Device {
        manager,
        local,
        network,
        clock,
        resolver,
    }
}

async fn start(device: &Device) {
    device
        .manager
        .start_session(
            UserId::new("host"),
            Some(GroupId::new("friday")),
            vec![
                SessionParticipant::new("p1", "Ana"),
                SessionParticipant::new("p2", "Bo"),
            ],
            FinancialConfig::default(),
        )
        .await
        .unwrap();
}

async fn synced_id(device: &Device) -> SessionId {
    match device.manager.flush().await.unwrap() {
        FlushOutcome::Synced { id } => id,
        other => panic!("expected synced flush, got {other:?}"),
    }
}

// ============================================================================
// Active session persistence
// ============================================================================

/// Five significant changes inside the debounce window produce one write.
#[tokio::test(start_paused = true)]
async fn debounced_burst_is_one_write() {
    init_tracing();
    let remote = MemoryRemote::new();
    let d = device(&remote, Resolution::UseRemote);
    start(&d).await;
    synced_id(&d).await;
    let writes_before = remote.write_count();

    for i in 0..5 {
        d.clock.advance(Duration::from_millis(150));
        d.manager
            .apply_change(|s| {
                s.participants
                    .push(SessionParticipant::new(format!("extra{i}"), "guest"))
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
    }
    d.manager.wait_for_pending_persist().await;

    assert_eq!(remote.write_count(), writes_before + 1);
    assert!(!d.manager.is_dirty());
}

/// Two flushes racing from different callers share one remote write.
#[tokio::test(start_paused = true)]
async fn racing_flushes_share_one_write() {
    init_tracing();
    let remote = MemoryRemote::new();
    remote.set_latency(Duration::from_millis(25));
    let d = device(&remote, Resolution::UseRemote);
    start(&d).await;

    let other = d.manager.clone();
    let (a, b) = tokio::join!(d.manager.flush(), async move { other.flush().await });

    let (a, b) = (a.unwrap(), b.unwrap());
    assert!(matches!(a, FlushOutcome::Synced { .. }));
    assert_eq!(a, b);
    assert_eq!(remote.write_count(), 1);
    assert_eq!(remote.len(Collection::Sessions), 1);
}

/// Local changes at 100 synced at 50 against a remote updated at 80 is a
/// conflict; the resolver is asked exactly once.
#[tokio::test(start_paused = true)]
async fn concurrent_edit_prompts_resolver_once() {
    init_tracing();
    let remote = MemoryRemote::new();
    let d = device(&remote, Resolution::Merge);

    let mut local = ActiveSession::new(UserId::new("host"), None, Timestamp::from_millis(10));
    local.id = Some(SessionId::new("s1"));
    local.updated_at = Timestamp::from_millis(100);
    local.local_modified_at = Some(Timestamp::from_millis(100));
    local.last_sync_at = Some(Timestamp::from_millis(50));
    local.sync_version = 2;
    d.manager.mirror().write(&local).await.unwrap();
    d.manager.restore().await.unwrap();

    let mut theirs = local.clone();
    theirs.updated_at = Timestamp::from_millis(80);
    theirs.local_modified_at = Some(Timestamp::from_millis(80));
    theirs.last_sync_at = Some(Timestamp::from_millis(80));
    theirs.sync_version = 7;
    remote.insert(Collection::Sessions, "s1", theirs.to_document().unwrap());

    let merged = d.manager.load(&SessionId::new("s1")).await.unwrap();

    assert_eq!(d.resolver.calls(), 1);
    assert_eq!(merged.sync_version, 7);
    assert_eq!(merged.updated_at, Timestamp::from_millis(80));
    assert!(merged.is_dirty());

    d.manager.load(&SessionId::new("s1")).await.unwrap();
    assert_eq!(d.resolver.calls(), 1);
}

/// A session whose remote document vanished is recreated on the next
/// flush and the local pointer follows the new id.
#[tokio::test(start_paused = true)]
async fn vanished_remote_document_is_recreated() {
    init_tracing();
    let remote = MemoryRemote::new();
    let d = device(&remote, Resolution::UseRemote);
    start(&d).await;
    let old = synced_id(&d).await;
    remote.remove(Collection::Sessions, old.as_str());

    d.clock.advance(Duration::from_secs(2));
    d.manager
        .apply_change(|s| s.status = sync_types::SessionStatus::Active)
        .unwrap();
    let new = synced_id(&d).await;

    assert_ne!(old, new);
    assert_eq!(d.manager.current().unwrap().id, Some(new.clone()));
    assert_eq!(d.manager.mirror().pointer().await.unwrap(), Some(new));
    assert_eq!(remote.len(Collection::Sessions), 1);
}

/// Two devices creating the same session shape for the same owner within
/// the guard window end up with a single remote document.
#[tokio::test(start_paused = true)]
async fn near_simultaneous_creates_collapse() {
    init_tracing();
    let remote = MemoryRemote::new();
    let phone = device(&remote, Resolution::UseRemote);
    let tablet = device(&remote, Resolution::UseRemote);
    start(&phone).await;
    tablet.clock.advance(Duration::from_secs(20));
    start(&tablet).await;

    let first = synced_id(&phone).await;
    let second = synced_id(&tablet).await;

    assert_eq!(first, second);
    assert_eq!(remote.create_count(), 1);
    assert_eq!(remote.len(Collection::Sessions), 1);
}

/// Two devices whose creates race past each other's lookup still settle on
/// the earlier created document.
#[tokio::test(start_paused = true)]
async fn racing_creates_converge_on_one_document() {
    init_tracing();
    let remote = MemoryRemote::new();
    remote.set_latency(Duration::from_millis(50));
    let phone = device(&remote, Resolution::UseRemote);
    let tablet = device(&remote, Resolution::UseRemote);
    start(&phone).await;
    tablet.clock.advance(Duration::from_secs(20));
    start(&tablet).await;

    let (first, second) = tokio::join!(synced_id(&phone), synced_id(&tablet));

    assert_eq!(first, second);
    assert_eq!(remote.create_count(), 2);
    assert_eq!(remote.delete_count(), 1);
    assert_eq!(remote.len(Collection::Sessions), 1);
    assert_eq!(phone.manager.current().unwrap().id, Some(first.clone()));
    assert_eq!(tablet.manager.current().unwrap().id, Some(first));
}

/// Offline edits stay local and go out once the network returns.
#[tokio::test(start_paused = true)]
async fn offline_edits_flush_on_reconnect() {
    init_tracing();
    let remote = MemoryRemote::new();
    let d = device(&remote, Resolution::UseRemote);
    d.manager.start_reconnect_flush();
    start(&d).await;
    synced_id(&d).await;

    d.network.set(NetworkState::Offline);
    d.clock.advance(Duration::from_secs(1));
    d.manager
        .apply_change(|s| s.participants.push(SessionParticipant::new("p3", "Cy")))
        .unwrap();
    d.manager.wait_for_pending_persist().await;

    assert_eq!(remote.update_count(), 0);
    assert!(d.manager.is_dirty());
    assert!(d.local.write_count() > 0);

    d.network.set(NetworkState::Online);
    tokio::time::sleep(Duration::from_millis(10)).await;
    d.manager.wait_for_pending_persist().await;

    assert_eq!(remote.update_count(), 1);
    assert!(!d.manager.is_dirty());
    d.manager.shutdown();
}

// ============================================================================
// Teardown
// ============================================================================

/// `clear` waits for the running flush, and no flush starts afterwards.
#[tokio::test(start_paused = true)]
async fn clear_is_safe_against_running_flush() {
    init_tracing();
    let remote = MemoryRemote::new();
    remote.set_latency(Duration::from_millis(200));
    let d = device(&remote, Resolution::UseRemote);
    start(&d).await;

    let flusher = d.manager.clone();
    let running = tokio::spawn(async move { flusher.flush().await });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let clearer = d.manager.clone();
    let clearing = tokio::spawn(async move { clearer.clear().await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(d.manager.flush().await, Err(SyncError::TearingDown));

    clearing.await.unwrap().unwrap();
    assert!(running.await.unwrap().is_ok());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(remote.write_count(), 1);
    assert!(d.manager.current().is_none());
    assert!(d.local.is_empty());
}

/// Waiting for pending persistence returns only after the running flush
/// landed on the remote.
#[tokio::test(start_paused = true)]
async fn wait_for_pending_persist_outlasts_flush() {
    init_tracing();
    let remote = MemoryRemote::new();
    remote.set_latency(Duration::from_millis(300));
    let d = device(&remote, Resolution::UseRemote);
    start(&d).await;

    let flusher = d.manager.clone();
    let _running = tokio::spawn(async move { flusher.flush().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(remote.write_count(), 0);

    d.manager.wait_for_pending_persist().await;

    assert_eq!(remote.write_count(), 1);
    assert!(!d.manager.is_dirty());
}

/// A discarded session is never resurrected from a stale snapshot.
#[tokio::test(start_paused = true)]
async fn discarded_session_is_not_restored() {
    init_tracing();
    let remote = MemoryRemote::new();
    let d = device(&remote, Resolution::UseRemote);
    start(&d).await;
    let id = synced_id(&d).await;
    let stale = d.manager.current().unwrap();

    d.manager.discard().await.unwrap();
    d.manager.mirror().write(&stale).await.unwrap();

    assert!(d.manager.restore().await.unwrap().is_none());
    assert!(d.manager.mirror().is_handled(&id).await.unwrap());
    assert!(remote.is_empty(Collection::Sessions));
}

// ============================================================================
// Realtime cache
// ============================================================================

/// Many upserts in one tick notify a collection subscriber once.
#[tokio::test]
async fn cache_notifications_coalesce() {
    init_tracing();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Timestamp::from_millis(NOW)));
    let cache = RealtimeCache::new(clock, FreshnessWindow::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let last = Arc::new(Mutex::new(Vec::new()));

    let (c, l) = (calls.clone(), last.clone());
    let _handle = cache.subscribe(Collection::Participants, None, move |docs| {
        c.fetch_add(1, Ordering::SeqCst);
        *l.lock().unwrap() = docs;
    });

    for i in 0..10 {
        cache.upsert(
            Collection::Participants,
            doc(json!({ "id": format!("p{i}"), "name": "guest" })),
        );
    }
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(last.lock().unwrap().len(), 10);
}

/// Repeated upserts of one record in one tick notify once, with the last value.
#[tokio::test]
async fn same_record_upserts_notify_final_value() {
    init_tracing();
    let cache = RealtimeCache::new(
        Arc::new(ManualClock::new(Timestamp::from_millis(NOW))),
        FreshnessWindow::default(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let _handle = cache.subscribe(Collection::Participants, None, move |docs| {
        s.lock().unwrap().push(docs);
    });

    for name in ["Ana", "Anna", "Annie"] {
        cache.upsert(
            Collection::Participants,
            doc(json!({ "id": "p1", "name": name })),
        );
    }
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].len(), 1);
    assert_eq!(seen[0][0]["name"], "Annie");
}

/// A collection is fresh strictly inside its window.
#[test]
fn cache_freshness_boundary() {
    let clock = ManualClock::new(Timestamp::from_millis(NOW));
    let cache = RealtimeCache::new(
        Arc::new(clock.clone()),
        FreshnessWindow::new(Duration::from_secs(60)),
    );
    cache.upsert(Collection::Groups, doc(json!({ "id": "g1", "name": "Friday" })));

    clock.advance(Duration::from_millis(59_999));
    assert!(cache.is_fresh(Collection::Groups));

    clock.advance(Duration::from_millis(1));
    assert!(cache.needs_refresh(Collection::Groups));
}

// ============================================================================
// Full context
// ============================================================================

/// A context loads the cache, keeps it live and reports stale collections.
#[tokio::test(start_paused = true)]
async fn context_bootstraps_and_tracks_staleness() {
    init_tracing();
    let remote = MemoryRemote::new();
    remote.insert(
        Collection::Groups,
        "g1",
        doc(json!({ "name": "Friday", "active": true })),
    );
    let clock = ManualClock::new(Timestamp::from_millis(NOW));
    let ctx = SyncContext::new(
        Config::default(),
        Arc::new(remote.clone()),
        Arc::new(MemoryLocalStore::new()),
        NetworkMonitor::new(NetworkState::Online),
        Arc::new(clock.clone()),
        Arc::new(FixedResolver::new(Resolution::UseRemote)),
    );

    ctx.initialize().await.unwrap();
    assert_eq!(ctx.orchestrator().load_status(Collection::Groups), LoadPhase::Fresh);

    remote.insert(Collection::Groups, "g2", doc(json!({ "name": "Sunday" })));
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    assert!(ctx.cache().get(Collection::Groups, "g2").is_some());

    clock.advance(Duration::from_secs(25 * 60 * 60));
    assert_eq!(ctx.orchestrator().load_status(Collection::Groups), LoadPhase::Stale);

    ctx.teardown().await;
    assert!(ctx.cache().is_empty(Collection::Groups));
}
