//! Pending-change set for the realtime cache.
//!
//! Ids changed by `upsert` accumulate here between ticks and are drained in
//! one go, so N writes to a collection produce one notification instead of N.
//! The set also carries the "flush already scheduled" flag that limits
//! scheduling to once per tick.

use std::collections::{BTreeMap, HashSet};
use sync_types::Collection;

/// Changed ids per collection, waiting for the next notification flush.
#[derive(Debug, Default)]
pub struct PendingChanges {
    /// Ids changed since the last drain, by collection.
    changed: BTreeMap<Collection, HashSet<String>>,
    /// A flush has been scheduled and not yet drained.
    scheduled: bool,
}

impl PendingChanges {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `id` changed in `collection`.
    ///
    /// Returns `false` if the id was already pending.
    pub fn mark(&mut self, collection: Collection, id: impl Into<String>) -> bool {
        self.changed.entry(collection).or_default().insert(id.into())
    }

    /// Request a flush. Returns `true` only for the first request since the
    /// last drain; the caller schedules the flush exactly then.
    pub fn request_flush(&mut self) -> bool {
        !std::mem::replace(&mut self.scheduled, true)
    }

    /// Whether a flush is scheduled and not yet drained.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Whether `id` is pending in `collection`.
    pub fn contains(&self, collection: Collection, id: &str) -> bool {
        self.changed
            .get(&collection)
            .is_some_and(|ids| ids.contains(id))
    }

    /// Whether no ids are pending.
    pub fn is_empty(&self) -> bool {
        self.changed.values().all(HashSet::is_empty)
    }

    /// Total number of pending ids across collections.
    pub fn len(&self) -> usize {
        self.changed.values().map(HashSet::len).sum()
    }

    /// Take every pending set and clear the scheduled flag.
    ///
    /// Collections come back in a stable order; empty sets are skipped.
    pub fn drain(&mut self) -> Vec<(Collection, HashSet<String>)> {
        self.scheduled = false;
        std::mem::take(&mut self.changed)
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .collect()
    }

    /// Drop everything without notifying.
    pub fn clear(&mut self) {
        self.changed.clear();
        self.scheduled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_marks_collapse() {
        let mut pending = PendingChanges::new();
        assert!(pending.mark(Collection::Groups, "g1"));
        assert!(!pending.mark(Collection::Groups, "g1"));
        assert!(!pending.mark(Collection::Groups, "g1"));
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn flush_is_requested_once_per_drain() {
        let mut pending = PendingChanges::new();
        assert!(pending.request_flush());
        assert!(!pending.request_flush());
        assert!(pending.is_scheduled());

        pending.drain();
        assert!(!pending.is_scheduled());
        assert!(pending.request_flush());
    }

    #[test]
    fn drain_groups_by_collection() {
        let mut pending = PendingChanges::new();
        pending.mark(Collection::Sessions, "s1");
        pending.mark(Collection::Participants, "p1");
        pending.mark(Collection::Participants, "p2");

        let drained = pending.drain();

        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, Collection::Participants);
        assert_eq!(drained[0].1.len(), 2);
        assert_eq!(drained[1].0, Collection::Sessions);
        assert!(pending.is_empty());
    }

    #[test]
    fn contains_checks_collection() {
        let mut pending = PendingChanges::new();
        pending.mark(Collection::Groups, "x");
        assert!(pending.contains(Collection::Groups, "x"));
        assert!(!pending.contains(Collection::Participants, "x"));
    }

    #[test]
    fn clear_drops_everything() {
        let mut pending = PendingChanges::new();
        pending.mark(Collection::Groups, "x");
        pending.request_flush();
        pending.clear();
        assert!(pending.is_empty());
        assert!(!pending.is_scheduled());
        assert!(pending.drain().is_empty());
    }
}
