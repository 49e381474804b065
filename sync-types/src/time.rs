//! Wall-clock timestamps and remote date normalization.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// Every time field on the wire (`createdAt`, `updatedAt`, `lastSyncAt`, ...)
/// is stored as a plain integer of this unit after normalization.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from epoch milliseconds.
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Current system time.
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Epoch milliseconds.
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    /// Absolute distance between two timestamps.
    pub fn abs_diff(&self, other: Timestamp) -> Duration {
        Duration::from_millis(self.0.abs_diff(other.0))
    }

    /// Add a duration, saturating at `u64::MAX`.
    pub fn saturating_add(&self, duration: Duration) -> Self {
        Self(self.0.saturating_add(duration.as_millis() as u64))
    }

    /// Subtract a duration, saturating at the epoch.
    pub fn saturating_sub(&self, duration: Duration) -> Self {
        Self(self.0.saturating_sub(duration.as_millis() as u64))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Rewrite remote timestamp objects into epoch milliseconds, in place.
///
/// Remote stores hand back dates as `{ "seconds": s, "nanoseconds": n }`
/// (or the underscore-prefixed REST form). Any object with exactly that
/// shape, at any depth, becomes an integer millisecond value so cached
/// records compare and deserialize uniformly.
pub fn normalize_dates(value: &mut Value) {
    match value {
        Value::Object(map) => {
            if let Some(millis) = timestamp_object_millis(map) {
                *value = Value::from(millis);
                return;
            }
            for nested in map.values_mut() {
                normalize_dates(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                normalize_dates(item);
            }
        }
        _ => {}
    }
}

fn timestamp_object_millis(map: &serde_json::Map<String, Value>) -> Option<u64> {
    if map.len() != 2 {
        return None;
    }
    let (secs, nanos) = match (map.get("seconds"), map.get("nanoseconds")) {
        (Some(s), Some(n)) => (s, n),
        _ => (map.get("_seconds")?, map.get("_nanoseconds")?),
    };
    let secs = secs.as_i64()?;
    let nanos = nanos.as_u64()?;
    if secs < 0 {
        return Some(0);
    }
    Some((secs as u64).saturating_mul(1000).saturating_add(nanos / 1_000_000))
}
