//! Network reachability state machine.
//!
//! Takes reachability transitions and sync completions as events and decides
//! when a reconnect should refresh stale collections. A refresh only fires on
//! `Offline -> Online`, and only once the cool-down since the last sync has
//! elapsed, so a flapping connection does not cause a refresh storm.
//!
//! The listener in sync-client performs the refresh; this module only
//! decides.

use std::time::Duration;
use sync_types::Timestamp;

/// Default cool-down between the last sync and a reconnect refresh.
pub const DEFAULT_RECONNECT_COOLDOWN: Duration = Duration::from_secs(30);

/// Reachability of the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkState {
    /// Remote reachable.
    Online,
    /// Remote unreachable.
    Offline,
    /// Not probed yet.
    #[default]
    Unknown,
}

impl NetworkState {
    /// Whether the remote is known to be reachable.
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkState::Online)
    }
}

/// Reachability tracker - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    /// Current state.
    pub state: NetworkState,
    /// Last time the remote was seen reachable.
    pub last_online_at: Option<Timestamp>,
    /// Last completed sync (load or refresh).
    pub last_sync_at: Option<Timestamp>,
    cooldown: Duration,
}

/// Inputs to the reachability tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityEvent {
    /// The monitor reported a (possibly unchanged) state.
    StateChanged {
        /// Reported state.
        state: NetworkState,
        /// Report time.
        at: Timestamp,
    },
    /// A sync against the remote completed.
    SyncCompleted {
        /// Completion time.
        at: Timestamp,
    },
}

/// Actions for the caller to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReachabilityAction {
    /// Refresh every collection that is stale or empty.
    RefreshStale,
    /// Reconnected inside the cool-down; nothing to do until it elapses.
    CooldownActive {
        /// Time left in the cool-down window.
        remaining: Duration,
    },
}

impl Reachability {
    /// Create a tracker in the `Unknown` state.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            state: NetworkState::Unknown,
            last_online_at: None,
            last_sync_at: None,
            cooldown,
        }
    }

    /// Process an event and return the new tracker plus actions to execute.
    pub fn on_event(self, event: ReachabilityEvent) -> (Self, Vec<ReachabilityAction>) {
        match event {
            ReachabilityEvent::SyncCompleted { at } => (
                Self {
                    last_sync_at: Some(at),
                    ..self
                },
                vec![],
            ),
            ReachabilityEvent::StateChanged { state, at } => {
                let reconnected = self.state == NetworkState::Offline && state.is_online();
                let actions = if reconnected {
                    vec![self.gate(at)]
                } else {
                    vec![]
                };
                let last_online_at = if state.is_online() {
                    Some(at)
                } else {
                    self.last_online_at
                };
                (
                    Self {
                        state,
                        last_online_at,
                        ..self
                    },
                    actions,
                )
            }
        }
    }

    fn gate(&self, now: Timestamp) -> ReachabilityAction {
        match self.last_sync_at {
            Some(last) => {
                let elapsed = now.duration_since(last);
                if elapsed >= self.cooldown {
                    ReachabilityAction::RefreshStale
                } else {
                    ReachabilityAction::CooldownActive {
                        remaining: self.cooldown - elapsed,
                    }
                }
            }
            None => ReachabilityAction::RefreshStale,
        }
    }
}

impl Default for Reachability {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_COOLDOWN)
    }
}
