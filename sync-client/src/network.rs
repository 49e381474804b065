//! Network reachability monitor.
//!
//! The application shell (or a test) reports reachability with
//! [`NetworkMonitor::set`]; services watch it through a
//! `tokio::sync::watch` receiver. Only actual changes wake watchers.

use std::sync::Arc;
use tokio::sync::watch;

pub use sync_core::NetworkState;

/// Shared reachability state.
///
/// Clones share the same state.
#[derive(Debug, Clone)]
pub struct NetworkMonitor {
    state: Arc<watch::Sender<NetworkState>>,
}

impl NetworkMonitor {
    /// Create a monitor with an initial state.
    pub fn new(initial: NetworkState) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self {
            state: Arc::new(tx),
        }
    }

    /// Current state.
    pub fn state(&self) -> NetworkState {
        *self.state.borrow()
    }

    /// Whether the remote is known to be reachable.
    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Report a state. Returns `true` if it differs from the previous one.
    pub fn set(&self, state: NetworkState) -> bool {
        self.state.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                tracing::info!("Network: {:?} -> {:?}", *current, state);
                *current = state;
                true
            }
        })
    }

    /// Watch for changes.
    pub fn subscribe(&self) -> watch::Receiver<NetworkState> {
        self.state.subscribe()
    }
}

impl Default for NetworkMonitor {
    fn default() -> Self {
        Self::new(NetworkState::Unknown)
    }
}
