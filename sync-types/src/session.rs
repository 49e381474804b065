//! The active session entity.
//!
//! An [`ActiveSession`] is the one mutable, money-bearing game session a
//! device is working on. Besides its content it carries the sync metadata
//! used for dirty tracking and conflict detection:
//!
//! - `updated_at` - authoritative remote clock
//! - `local_modified_at` - last local mutation
//! - `last_sync_at` - last confirmed persist or load
//! - `sync_version` - bumped on every confirmed persist or load
//!
//! The entity is *dirty* iff `local_modified_at > last_sync_at`.

use serde::{Deserialize, Serialize};

use crate::{GroupId, SessionId, Timestamp, UserId};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    /// Being set up: participants and stakes still changing.
    #[default]
    Draft,
    /// Game in progress.
    Active,
    /// Game over, cash-outs being entered.
    Settling,
    /// Settled and closed.
    Completed,
    /// Abandoned.
    Cancelled,
}

impl SessionStatus {
    /// Terminal statuses never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Staying in the same status is always allowed.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        if *self == next {
            return true;
        }
        match (self, next) {
            (Draft, Active) | (Draft, Cancelled) => true,
            (Active, Settling) | (Active, Cancelled) => true,
            // Reopening a settlement to fix a cash-out is allowed.
            (Settling, Active) | (Settling, Completed) | (Settling, Cancelled) => true,
            _ => false,
        }
    }
}

/// A participant's seat in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionParticipant {
    /// Reference into the `participants` collection.
    pub participant_id: String,
    /// Name shown at the table.
    pub display_name: String,
    /// Number of buy-ins taken so far.
    #[serde(default)]
    pub buy_ins: u32,
    /// Final cash-out in cents, `null` until entered.
    #[serde(default)]
    pub cash_out_cents: Option<i64>,
    /// Seat number, omitted when unassigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seat: Option<u32>,
}

impl SessionParticipant {
    /// Seat a participant with one buy-in and no cash-out yet.
    pub fn new(participant_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: display_name.into(),
            buy_ins: 1,
            cash_out_cents: None,
            seat: None,
        }
    }
}

/// Snapshot of the stakes a session was played at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinancialConfig {
    /// ISO 4217 currency code.
    pub currency: String,
    /// Cost of one buy-in in cents.
    pub buy_in_cents: i64,
    /// Cost of a rebuy in cents when it differs from the buy-in.
    #[serde(default)]
    pub rebuy_cents: Option<i64>,
    /// Payment grouping used for settlement.
    #[serde(default)]
    pub payment_grouping_id: Option<String>,
}

impl Default for FinancialConfig {
    fn default() -> Self {
        Self {
            currency: "EUR".to_string(),
            buy_in_cents: 0,
            rebuy_cents: None,
            payment_grouping_id: None,
        }
    }
}

/// Computed net result for one participant, produced by settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    /// Reference into the `participants` collection.
    pub participant_id: String,
    /// Net win (positive) or loss (negative) in cents.
    pub net_cents: i64,
}

/// The single mutable session a device currently owns and edits.
///
/// Field nullability is part of the document schema: `Option` fields
/// without `skip_serializing_if` are *nullable* and always written (as
/// `null` when empty); fields with it are *omittable* and left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    /// Remote document id, absent until the first persist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<SessionId>,
    /// Lifecycle status.
    #[serde(default)]
    pub status: SessionStatus,
    /// User that created the session.
    pub owner_id: UserId,
    /// Playing group, nullable for ad-hoc sessions.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    /// Users allowed to read/edit, evaluated by the remote access policy.
    #[serde(default)]
    pub access: Vec<UserId>,
    /// Seated participants.
    #[serde(default)]
    pub participants: Vec<SessionParticipant>,
    /// Stakes snapshot.
    #[serde(default)]
    pub financials: FinancialConfig,
    /// Settlement output, `null` until computed.
    #[serde(default)]
    pub results: Option<Vec<ParticipantResult>>,
    /// Free-text notes. Editing these is cosmetic and never triggers a flush.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Authoritative remote clock.
    pub updated_at: Timestamp,
    /// Last local mutation. Omitted by legacy documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_modified_at: Option<Timestamp>,
    /// Last confirmed persist/load.
    #[serde(default)]
    pub last_sync_at: Option<Timestamp>,
    /// Confirmed sync counter.
    #[serde(default)]
    pub sync_version: u64,
}

impl ActiveSession {
    /// Create a fresh in-memory session with default values.
    ///
    /// The session starts dirty: it has a local modification and has never
    /// been synced.
    pub fn new(owner_id: UserId, group_id: Option<GroupId>, now: Timestamp) -> Self {
        Self {
            id: None,
            status: SessionStatus::Draft,
            access: vec![owner_id.clone()],
            owner_id,
            group_id,
            participants: Vec::new(),
            financials: FinancialConfig::default(),
            results: None,
            notes: None,
            created_at: now,
            updated_at: now,
            local_modified_at: Some(now),
            last_sync_at: None,
            sync_version: 0,
        }
    }

    /// Number of seated participants.
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    /// `local_modified_at > last_sync_at`.
    pub fn is_dirty(&self) -> bool {
        match (self.local_modified_at, self.last_sync_at) {
            (Some(modified), Some(synced)) => modified > synced,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Whether the entity carries the sync metadata written by this version.
    ///
    /// Documents written before dirty tracking existed lack both
    /// `localModifiedAt` and `lastSyncAt`.
    pub fn has_sync_metadata(&self) -> bool {
        self.local_modified_at.is_some() && self.last_sync_at.is_some()
    }

    /// Stamp a local mutation.
    pub fn touch(&mut self, now: Timestamp) {
        self.local_modified_at = Some(now);
        self.updated_at = now;
    }

    /// Record a confirmed persist or load.
    pub fn mark_synced(&mut self, at: Timestamp) {
        self.last_sync_at = Some(at);
        self.sync_version = self.sync_version.saturating_add(1);
    }

    /// Structural comparison of everything that matters to other devices.
    ///
    /// Ignores sync metadata and cosmetic fields (`notes`).
    pub fn content_eq(&self, other: &ActiveSession) -> bool {
        self.status == other.status
            && self.owner_id == other.owner_id
            && self.group_id == other.group_id
            && self.access == other.access
            && self.participants == other.participants
            && self.financials == other.financials
            && self.results == other.results
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ActiveSession {
        ActiveSession::new(UserId::new("owner"), Some(GroupId::new("g1")), Timestamp::from_millis(10))
    }

    // ===========================================
    // Status Tests
    // ===========================================

    #[test]
    fn terminal_statuses() {
        assert!(SessionStatus::Completed.is_terminal());
        assert!(SessionStatus::Cancelled.is_terminal());
        assert!(!SessionStatus::Draft.is_terminal());
        assert!(!SessionStatus::Settling.is_terminal());
    }

    #[test]
    fn forward_transitions_allowed() {
        assert!(SessionStatus::Draft.can_transition_to(SessionStatus::Active));
        assert!(SessionStatus::Active.can_transition_to(SessionStatus::Settling));
        assert!(SessionStatus::Settling.can_transition_to(SessionStatus::Completed));
        assert!(SessionStatus::Settling.can_transition_to(SessionStatus::Active));
    }

    #[test]
    fn terminal_statuses_are_final() {
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Active));
        assert!(!SessionStatus::Cancelled.can_transition_to(SessionStatus::Draft));
        assert!(SessionStatus::Completed.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn skipping_settlement_is_rejected() {
        assert!(!SessionStatus::Draft.can_transition_to(SessionStatus::Completed));
        assert!(!SessionStatus::Active.can_transition_to(SessionStatus::Completed));
    }

    // ===========================================
    // Dirty Tracking Tests
    // ===========================================

    #[test]
    fn new_session_is_dirty_and_unsynced() {
        let s = session();
        assert!(s.id.is_none());
        assert!(s.is_dirty());
        assert!(!s.has_sync_metadata());
        assert_eq!(s.access, vec![UserId::new("owner")]);
    }

    #[test]
    fn mark_synced_cleans_and_bumps_version() {
        let mut s = session();
        s.mark_synced(Timestamp::from_millis(10));
        assert!(!s.is_dirty());
        assert_eq!(s.sync_version, 1);

        s.touch(Timestamp::from_millis(11));
        assert!(s.is_dirty());
        assert_eq!(s.updated_at, Timestamp::from_millis(11));
    }

    #[test]
    fn legacy_session_without_local_modification_is_clean() {
        let mut s = session();
        s.local_modified_at = None;
        assert!(!s.is_dirty());
    }

    // ===========================================
    // Content Comparison Tests
    // ===========================================

    #[test]
    fn content_eq_ignores_metadata_and_notes() {
        let a = session();
        let mut b = a.clone();
        b.notes = Some("bring snacks".into());
        b.touch(Timestamp::from_millis(99));
        b.sync_version = 7;
        assert!(a.content_eq(&b));
    }

    #[test]
    fn content_eq_sees_participant_edits() {
        let a = session();
        let mut b = a.clone();
        b.participants.push(SessionParticipant::new("p1", "Ana"));
        assert!(!a.content_eq(&b));

        let mut c = b.clone();
        c.participants[0].buy_ins = 2;
        assert!(!b.content_eq(&c));
    }
}
