//! Duplicate-create guard.
//!
//! Before the first create of a session, the remote is queried for a very
//! recent document that looks like the same session: same owner, same
//! group, same number of participants, same non-terminal status. If one
//! exists its id is reused instead of creating a second document.
//!
//! Two devices can still both create before either sees the other. After a
//! create the query is repeated and every device keeps the same
//! [`survivor`](DuplicateGuard::survivor), so they converge on one id.

use std::time::Duration;
use sync_types::{ActiveSession, Timestamp};

/// Default guard window (5 minutes).
pub const DEFAULT_DUPLICATE_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Matches a not-yet-created session against recent remote documents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DuplicateGuard {
    window: Duration,
}

impl DuplicateGuard {
    /// Create a guard with the given look-back window.
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Oldest creation time a candidate may have.
    pub fn since(&self, now: Timestamp) -> Timestamp {
        now.saturating_sub(self.window)
    }

    /// Whether `candidate` is an equivalent of `local` created inside the window.
    pub fn is_duplicate(&self, local: &ActiveSession, candidate: &ActiveSession, now: Timestamp) -> bool {
        candidate.id.is_some()
            && candidate.created_at >= self.since(now)
            && !candidate.status.is_terminal()
            && candidate.status == local.status
            && candidate.owner_id == local.owner_id
            && candidate.group_id == local.group_id
            && candidate.participant_count() == local.participant_count()
    }

    /// The most recently created duplicate among `candidates`, if any.
    pub fn find<'a>(
        &self,
        local: &ActiveSession,
        candidates: &'a [ActiveSession],
        now: Timestamp,
    ) -> Option<&'a ActiveSession> {
        candidates
            .iter()
            .filter(|c| self.is_duplicate(local, c, now))
            .max_by_key(|c| c.created_at)
    }

    /// The copy to keep when `local` exists remotely more than once: the
    /// earliest created duplicate, ties broken by the smaller id.
    pub fn survivor<'a>(
        &self,
        local: &ActiveSession,
        candidates: &'a [ActiveSession],
        now: Timestamp,
    ) -> Option<&'a ActiveSession> {
        candidates
            .iter()
            .filter(|c| self.is_duplicate(local, c, now))
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
    }
}

impl Default for DuplicateGuard {
    fn default() -> Self {
        Self::new(DEFAULT_DUPLICATE_WINDOW)
    }
}
