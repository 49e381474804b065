//! Application-level sync context.
//!
//! Wires one [`RealtimeCache`], one [`SyncOrchestrator`] and one
//! [`ActiveSessionManager`] over shared remote, local and network handles,
//! and owns their startup and teardown order.

use std::sync::Arc;

use sync_types::ActiveSession;

use crate::cache::RealtimeCache;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::local::{FileLocalStore, LocalStore};
use crate::manager::ActiveSessionManager;
use crate::network::NetworkMonitor;
use crate::orchestrator::SyncOrchestrator;
use crate::remote::RemoteStore;
use crate::resolver::ConflictResolver;
use crate::SyncError;

/// The sync services of one signed-in user.
#[derive(Debug, Clone)]
pub struct SyncContext {
    config: Config,
    network: NetworkMonitor,
    orchestrator: SyncOrchestrator,
    manager: ActiveSessionManager,
}

impl SyncContext {
    /// Build the services. Nothing runs until [`initialize`](Self::initialize).
    pub fn new(
        config: Config,
        remote: Arc<dyn RemoteStore>,
        local: Arc<dyn LocalStore>,
        network: NetworkMonitor,
        clock: Arc<dyn Clock>,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Self {
        let cache = RealtimeCache::new(clock.clone(), config.cache.freshness_window());
        let orchestrator = SyncOrchestrator::new(
            cache,
            remote.clone(),
            network.clone(),
            clock.clone(),
            config.orchestrator.clone(),
        );
        let manager = ActiveSessionManager::new(
            remote,
            local,
            network.clone(),
            clock,
            resolver,
            &config.session,
        );
        Self {
            config,
            network,
            orchestrator,
            manager,
        }
    }

    /// Build the services over a file-backed local store in
    /// `config.storage.data_dir` and the system clock.
    pub async fn open(
        config: Config,
        remote: Arc<dyn RemoteStore>,
        network: NetworkMonitor,
        resolver: Arc<dyn ConflictResolver>,
    ) -> Result<Self, SyncError> {
        let local = FileLocalStore::open(config.storage.data_dir.clone()).await?;
        tracing::info!("Local store at {}", local.dir().display());
        Ok(Self::new(
            config,
            remote,
            Arc::new(local),
            network,
            Arc::new(SystemClock),
            resolver,
        ))
    }

    /// Load the cache, attach realtime feeds, start the reconnect
    /// listeners and restore the session left by a previous run.
    pub async fn initialize(&self) -> Result<Option<ActiveSession>, SyncError> {
        tracing::info!("Initializing sync (network {:?})", self.network.state());

        self.orchestrator.initialize().await;
        self.orchestrator.attach_realtime_subscriptions().await;
        self.orchestrator.start_network_listener();
        self.manager.start_reconnect_flush();

        let restored = self.manager.restore().await?;
        if let Some(session) = &restored {
            tracing::info!("Restored active session {:?}", session.id);
        }
        Ok(restored)
    }

    /// Wait for pending session writes, then stop every background task
    /// and reset the cache.
    ///
    /// The active session itself is kept in local storage for the next run.
    pub async fn teardown(&self) {
        tracing::info!("Tearing down sync");
        self.manager.wait_for_pending_persist().await;
        self.manager.shutdown();
        self.orchestrator.cleanup();
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Network monitor shared by every service.
    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    /// The realtime cache.
    pub fn cache(&self) -> &RealtimeCache {
        self.orchestrator.cache()
    }

    /// The orchestrator.
    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }

    /// The active-session manager.
    pub fn sessions(&self) -> &ActiveSessionManager {
        &self.manager
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::local::MemoryLocalStore;
    use crate::network::NetworkState;
    use crate::remote::MemoryRemote;
    use crate::resolver::FixedResolver;
    use serde_json::json;
    use sync_core::Resolution;
    use sync_types::{Collection, FinancialConfig, Timestamp, UserId};

    fn context(remote: &MemoryRemote, local: &MemoryLocalStore) -> SyncContext {
        SyncContext::new(
            Config::default(),
            Arc::new(remote.clone()),
            Arc::new(local.clone()),
            NetworkMonitor::new(NetworkState::Online),
            Arc::new(ManualClock::new(Timestamp::from_millis(1_000_000))),
            Arc::new(FixedResolver::new(Resolution::UseRemote)),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn initialize_loads_cache_and_attaches_feeds() {
        let remote = MemoryRemote::new();
        let doc = json!({ "name": "Ana" }).as_object().cloned().unwrap();
        remote.insert(Collection::Participants, "p1", doc);
        let ctx = context(&remote, &MemoryLocalStore::new());

        let restored = ctx.initialize().await.unwrap();

        assert!(restored.is_none());
        assert!(ctx.cache().get(Collection::Participants, "p1").is_some());
        assert_eq!(remote.subscriber_count(Collection::Participants), 1);
        ctx.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_persists_pending_session_first() {
        let remote = MemoryRemote::new();
        let local = MemoryLocalStore::new();
        let ctx = context(&remote, &local);
        ctx.initialize().await.unwrap();

        ctx.sessions()
            .start_session(UserId::new("owner"), None, vec![], FinancialConfig::default())
            .await
            .unwrap();
        ctx.teardown().await;

        assert_eq!(remote.create_count(), 1);
        assert!(ctx.cache().is_empty(Collection::Sessions));

        let next = context(&remote, &local);
        let restored = next.initialize().await.unwrap().unwrap();
        assert!(restored.id.is_some());
        next.teardown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn torn_down_context_rejects_session_changes() {
        let remote = MemoryRemote::new();
        let ctx = context(&remote, &MemoryLocalStore::new());
        ctx.initialize().await.unwrap();
        ctx.sessions()
            .start_session(UserId::new("owner"), None, vec![], FinancialConfig::default())
            .await
            .unwrap();

        ctx.teardown().await;

        let change = ctx.sessions().apply_change(|s| s.notes = Some("late".into()));
        assert_eq!(change, Err(SyncError::TearingDown));
        assert_eq!(ctx.sessions().flush().await, Err(SyncError::TearingDown));
        assert_eq!(remote.write_count(), 1);
    }
}
