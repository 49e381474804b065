//! Change classification for the active session.
//!
//! Every local mutation is classified before anything touches the network:
//! only *significant* changes schedule a flush. Cosmetic edits (notes,
//! re-stamped metadata) stay in memory until the next significant change
//! carries them along.

use sync_types::{ActiveSession, SessionStatus};

/// Why a change counts as significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignificantReason {
    /// Lifecycle status moved.
    StatusChanged,
    /// A participant was seated or removed.
    ParticipantCountChanged,
    /// Any other content difference (buy-ins, stakes, results, access...).
    ContentChanged,
}

/// Result of comparing a session before and after a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// Must be persisted; schedules a debounced flush.
    Significant(SignificantReason),
    /// Local only; never triggers network I/O on its own.
    Cosmetic,
}

impl ChangeKind {
    /// Whether this change schedules a flush.
    pub fn is_significant(&self) -> bool {
        matches!(self, ChangeKind::Significant(_))
    }
}

/// Classify the difference between `before` and `after`.
///
/// Checks run cheapest first; the deep content comparison is structural
/// over every non-metadata field.
pub fn classify_change(before: &ActiveSession, after: &ActiveSession) -> ChangeKind {
    if before.status != after.status {
        return ChangeKind::Significant(SignificantReason::StatusChanged);
    }
    if before.participant_count() != after.participant_count() {
        return ChangeKind::Significant(SignificantReason::ParticipantCountChanged);
    }
    if !before.content_eq(after) {
        return ChangeKind::Significant(SignificantReason::ContentChanged);
    }
    ChangeKind::Cosmetic
}

/// A mutation tried to move the session to a status it cannot reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalTransition {
    /// Status before the mutation.
    pub from: SessionStatus,
    /// Status the mutation asked for.
    pub to: SessionStatus,
}

impl std::fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "illegal status transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

/// Reject a mutation whose status change is not in the transition table.
pub fn check_transition(
    before: &ActiveSession,
    after: &ActiveSession,
) -> Result<(), IllegalTransition> {
    if before.status.can_transition_to(after.status) {
        Ok(())
    } else {
        Err(IllegalTransition {
            from: before.status,
            to: after.status,
        })
    }
}
