//! Freshness math for cached collections.
//!
//! A collection is fresh while it is non-empty and its last update is
//! younger than the freshness window. An empty collection is never fresh,
//! however recently it was touched.

use std::time::Duration;
use sync_types::Timestamp;

/// Default freshness window (24 hours).
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Maximum age before a cached collection is considered stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessWindow(Duration);

impl FreshnessWindow {
    /// Create a window of the given length.
    pub fn new(window: Duration) -> Self {
        Self(window)
    }

    /// Window length.
    pub fn duration(&self) -> Duration {
        self.0
    }

    /// `now - last_updated_at < window` and the collection holds records.
    pub fn is_fresh(&self, last_updated_at: Option<Timestamp>, len: usize, now: Timestamp) -> bool {
        match last_updated_at {
            Some(at) if len > 0 => now.duration_since(at) < self.0,
            _ => false,
        }
    }

    /// Inverse of [`is_fresh`](Self::is_fresh).
    pub fn needs_refresh(&self, last_updated_at: Option<Timestamp>, len: usize, now: Timestamp) -> bool {
        !self.is_fresh(last_updated_at, len, now)
    }
}

impl Default for FreshnessWindow {
    fn default() -> Self {
        Self(DEFAULT_FRESHNESS_WINDOW)
    }
}
