//! Wall-clock source.
//!
//! Every timestamp the services stamp (`local_modified_at`, `last_sync_at`,
//! cache `last_updated_at`) comes from a [`Clock`], so tests can drive time
//! by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sync_types::Timestamp;

/// Source of wall-clock timestamps.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time.
    fn now(&self) -> Timestamp;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start.as_millis())),
        }
    }

    /// Set the current time.
    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.as_millis(), Ordering::SeqCst);
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(Timestamp::from_millis(100));
        assert_eq!(clock.now(), Timestamp::from_millis(100));

        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.now(), Timestamp::from_millis(150));

        clock.set(Timestamp::from_millis(7));
        assert_eq!(clock.now(), Timestamp::from_millis(7));
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(Timestamp::from_millis(0));
        let shared = clock.clone();
        clock.advance(Duration::from_secs(1));
        assert_eq!(shared.now(), Timestamp::from_millis(1_000));
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now().as_millis() > 0);
    }
}
