//! Debounce policy for active-session persistence.
//!
//! Trailing-edge: every significant change restarts the window. A session
//! that already has a remote id waits less than one that still has to be
//! created, so a burst of setup edits collapses into a single create.

use std::time::Duration;
use sync_types::ActiveSession;

/// Default delay once the session has a remote id.
pub const DEFAULT_PERSISTED_DELAY: Duration = Duration::from_millis(1_000);

/// Default delay before the first create.
pub const DEFAULT_FIRST_CREATE_DELAY: Duration = Duration::from_millis(3_000);

/// Debounce delays by persistence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebouncePolicy {
    /// Delay after the last significant change for a persisted session.
    pub persisted: Duration,
    /// Delay after the last significant change before the first create.
    pub first_create: Duration,
}

impl DebouncePolicy {
    /// Create a policy with explicit delays.
    pub fn new(persisted: Duration, first_create: Duration) -> Self {
        Self {
            persisted,
            first_create,
        }
    }

    /// Delay to wait before flushing `session`.
    pub fn delay_for(&self, session: &ActiveSession) -> Duration {
        if session.id.is_some() {
            self.persisted
        } else {
            self.first_create
        }
    }
}

impl Default for DebouncePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_PERSISTED_DELAY, DEFAULT_FIRST_CREATE_DELAY)
    }
}
