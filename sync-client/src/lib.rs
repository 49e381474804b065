//! # sync-client
//!
//! Offline-first sync services for kitty-sync applications.
//!
//! ## Services
//!
//! - **[`RealtimeCache`]**: in-memory, per-collection cache with freshness
//!   tracking and coalesced subscriber notifications
//! - **[`SyncOrchestrator`]**: prioritized initial load, realtime change
//!   feeds and reconnect refresh
//! - **[`ActiveSessionManager`]**: the session being edited, with debounced
//!   flushes, conflict resolution and a local durable mirror
//! - **[`SyncContext`]**: wires the three together and owns startup and
//!   teardown
//!
//! Decisions live in `sync-core`; this crate performs the I/O around them.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kitty_sync_client::{Config, FixedResolver, MemoryRemote, NetworkMonitor, SyncContext};
//!
//! let ctx = SyncContext::open(
//!     Config::default(),
//!     Arc::new(MemoryRemote::new()),
//!     NetworkMonitor::default(),
//!     Arc::new(FixedResolver::new(kitty_sync_client::Resolution::UseRemote)),
//! )
//! .await?;
//!
//! let restored = ctx.initialize().await?;
//! ctx.sessions().apply_change(|s| s.notes = Some("late start".into()))?;
//! ctx.teardown().await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod local;
pub mod manager;
pub mod network;
pub mod orchestrator;
pub mod remote;
pub mod resolver;

pub use cache::{CacheCallback, CacheRecord, RealtimeCache, SubscriptionHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CacheConfig, Config, ConfigError, OrchestratorConfig, SessionConfig, StorageConfig,
};
pub use context::SyncContext;
pub use error::{RemoteError, StorageError, SyncError};
pub use local::{FileLocalStore, LocalStore, MemoryLocalStore, SessionMirror};
pub use manager::{ActiveSessionManager, FlushOutcome, ManagerStatus};
pub use network::{NetworkMonitor, NetworkState};
pub use orchestrator::SyncOrchestrator;
pub use remote::{
    ChangeEvent, ChangeFeed, FeedEventKind, LoadScope, MemoryRemote, RecentSessionQuery,
    RemoteStore,
};
pub use resolver::{ConflictResolver, FixedResolver, Resolution};
