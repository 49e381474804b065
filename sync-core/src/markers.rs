//! "Handled-deleted" markers.
//!
//! When a session is discarded, a `handled-deleted:<id>` marker is written
//! to local storage so a stale pointer or snapshot for that id is never
//! restored. Markers are bounded: once there are more than `threshold` of
//! them, all but the `retain` most recent are dropped.

use sync_types::{SessionId, Timestamp};

/// Local storage key prefix for handled-deleted markers.
pub const MARKER_PREFIX: &str = "handled-deleted:";

/// Default marker count above which collection runs.
pub const DEFAULT_MARKER_THRESHOLD: usize = 20;

/// Default number of markers kept after collection.
pub const DEFAULT_MARKER_RETAIN: usize = 5;

/// Storage key for the marker of `id`.
pub fn marker_key(id: &SessionId) -> String {
    format!("{MARKER_PREFIX}{}", id.as_str())
}

/// Session id encoded in a marker key.
pub fn parse_marker_key(key: &str) -> Option<SessionId> {
    key.strip_prefix(MARKER_PREFIX)
        .filter(|id| !id.is_empty())
        .map(SessionId::new)
}

/// Garbage collection policy for markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerPolicy {
    /// Collect once the marker count exceeds this.
    pub threshold: usize,
    /// Markers kept after collection, most recent first.
    pub retain: usize,
}

impl MarkerPolicy {
    /// Create a policy.
    pub fn new(threshold: usize, retain: usize) -> Self {
        Self { threshold, retain }
    }

    /// Keys to delete from `markers` (key, handled-at pairs).
    ///
    /// Empty while the count is at or below the threshold.
    pub fn expired(&self, markers: &[(String, Timestamp)]) -> Vec<String> {
        if markers.len() <= self.threshold {
            return Vec::new();
        }
        let mut sorted: Vec<&(String, Timestamp)> = markers.iter().collect();
        // Newest first; key breaks ties so the outcome is stable.
        sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        sorted
            .into_iter()
            .skip(self.retain)
            .map(|(key, _)| key.clone())
            .collect()
    }
}

impl Default for MarkerPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER_THRESHOLD, DEFAULT_MARKER_RETAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(n: u64) -> Vec<(String, Timestamp)> {
        (0..n)
            .map(|i| {
                (
                    marker_key(&SessionId::new(format!("s{i}"))),
                    Timestamp::from_millis(i),
                )
            })
            .collect()
    }

    #[test]
    fn key_round_trips() {
        let id = SessionId::new("abc");
        let key = marker_key(&id);
        assert_eq!(key, "handled-deleted:abc");
        assert_eq!(parse_marker_key(&key), Some(id));
        assert_eq!(parse_marker_key("active-session-id"), None);
        assert_eq!(parse_marker_key("handled-deleted:"), None);
    }

    #[test]
    fn nothing_expires_at_threshold() {
        let policy = MarkerPolicy::new(3, 1);
        assert!(policy.expired(&markers(3)).is_empty());
    }

    #[test]
    fn over_threshold_keeps_most_recent() {
        let policy = MarkerPolicy::new(3, 2);
        let expired = policy.expired(&markers(4));

        assert_eq!(expired.len(), 2);
        assert!(expired.contains(&"handled-deleted:s0".to_string()));
        assert!(expired.contains(&"handled-deleted:s1".to_string()));
    }

    #[test]
    fn default_policy() {
        let policy = MarkerPolicy::default();
        assert!(policy.expired(&markers(20)).is_empty());
        assert_eq!(policy.expired(&markers(21)).len(), 16);
    }
}
