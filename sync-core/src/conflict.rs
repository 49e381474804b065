//! Conflict detection and resolution for the active session.
//!
//! A conflict exists when both sides changed since the last confirmed sync:
//! the local copy is dirty (`local_modified_at > last_sync_at`) and the
//! remote copy read during a load is newer (`remote.updated_at > last_sync_at`).
//!
//! Legacy copies written before sync metadata existed cannot be compared that
//! way. For those a time-proximity heuristic decides: clocks within the
//! proximity window are taken to be the same write.

use std::time::Duration;
use sync_types::{ActiveSession, Timestamp};

/// Outcome of comparing a local copy against a freshly loaded remote copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictCheck {
    /// Local has nothing unsynced; the remote copy wins outright.
    AdoptRemote,
    /// Local has unsynced edits and the remote did not move.
    KeepLocal,
    /// Both sides moved; the resolver must decide.
    Conflict,
}

/// The three answers a conflict resolver can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// Discard local edits and take the remote copy.
    UseRemote,
    /// Keep local content, stay dirty so the next flush overwrites remote.
    UseLocal,
    /// Keep local content but adopt the remote clock and version.
    Merge,
}

/// Compare `local` against `remote`.
pub fn detect_conflict(
    local: &ActiveSession,
    remote: &ActiveSession,
    legacy_proximity: Duration,
) -> ConflictCheck {
    if !local.is_dirty() {
        return ConflictCheck::AdoptRemote;
    }

    match local.last_sync_at {
        Some(last_sync) if local.has_sync_metadata() => {
            if remote.updated_at > last_sync {
                ConflictCheck::Conflict
            } else {
                ConflictCheck::KeepLocal
            }
        }
        _ => {
            if local.updated_at.abs_diff(remote.updated_at) <= legacy_proximity {
                ConflictCheck::KeepLocal
            } else {
                ConflictCheck::Conflict
            }
        }
    }
}

/// Take the remote copy as the new in-memory entity.
///
/// A load is a confirmed sync: the result is clean and its version moves
/// past both inputs.
pub fn adopt_remote(
    local: Option<&ActiveSession>,
    remote: &ActiveSession,
    now: Timestamp,
) -> ActiveSession {
    let mut adopted = remote.clone();
    adopted.sync_version = local
        .map(|l| l.sync_version)
        .unwrap_or(0)
        .max(remote.sync_version);
    adopted.local_modified_at = Some(now);
    adopted.mark_synced(now);
    adopted
}

/// Build the entity that results from a resolver's answer.
pub fn apply_resolution(
    local: &ActiveSession,
    remote: &ActiveSession,
    resolution: Resolution,
    now: Timestamp,
) -> ActiveSession {
    match resolution {
        Resolution::UseRemote => adopt_remote(Some(local), remote, now),
        Resolution::UseLocal => {
            let mut kept = local.clone();
            reflag_dirty(&mut kept, now);
            kept
        }
        Resolution::Merge => {
            let mut merged = local.clone();
            merged.updated_at = remote.updated_at;
            merged.sync_version = remote.sync_version;
            merged.last_sync_at = Some(
                local
                    .last_sync_at
                    .map_or(remote.updated_at, |t| t.max(remote.updated_at)),
            );
            reflag_dirty(&mut merged, now);
            merged
        }
    }
}

/// Guarantee `local_modified_at > last_sync_at`.
fn reflag_dirty(session: &mut ActiveSession, now: Timestamp) {
    let floor = session
        .last_sync_at
        .map(|t| t.saturating_add(Duration::from_millis(1)))
        .unwrap_or(now);
    session.local_modified_at = Some(now.max(floor));
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_types::{SessionId, SessionParticipant, UserId};

    const PROXIMITY: Duration = Duration::from_secs(5);

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    fn synced_local(modified: u64, last_sync: u64) -> ActiveSession {
        let mut s = ActiveSession::new(UserId::new("owner"), None, ts(1));
        s.id = Some(SessionId::new("s1"));
        s.local_modified_at = Some(ts(modified));
        s.last_sync_at = Some(ts(last_sync));
        s.updated_at = ts(modified);
        s.sync_version = 3;
        s
    }

    fn remote(updated: u64) -> ActiveSession {
        let mut s = ActiveSession::new(UserId::new("owner"), None, ts(1));
        s.id = Some(SessionId::new("s1"));
        s.updated_at = ts(updated);
        s.local_modified_at = Some(ts(updated));
        s.last_sync_at = Some(ts(updated));
        s.sync_version = 5;
        s.participants.push(SessionParticipant::new("p9", "Remote"));
        s
    }

    // ===========================================
    // Detection Tests
    // ===========================================

    #[test]
    fn dirty_local_and_newer_remote_conflict() {
        let local = synced_local(100, 50);
        assert_eq!(
            detect_conflict(&local, &remote(80), PROXIMITY),
            ConflictCheck::Conflict
        );
    }

    #[test]
    fn dirty_local_and_unchanged_remote_keeps_local() {
        let local = synced_local(100, 50);
        assert_eq!(
            detect_conflict(&local, &remote(50), PROXIMITY),
            ConflictCheck::KeepLocal
        );
    }

    #[test]
    fn clean_local_adopts_remote() {
        let local = synced_local(50, 50);
        assert_eq!(
            detect_conflict(&local, &remote(80), PROXIMITY),
            ConflictCheck::AdoptRemote
        );
    }

    #[test]
    fn legacy_local_within_proximity_is_same_write() {
        let mut local = synced_local(10_000, 0);
        local.last_sync_at = None;
        local.updated_at = ts(10_000);
        assert_eq!(
            detect_conflict(&local, &remote(13_000), PROXIMITY),
            ConflictCheck::KeepLocal
        );
    }

    #[test]
    fn legacy_local_far_from_remote_conflicts() {
        let mut local = synced_local(10_000, 0);
        local.last_sync_at = None;
        local.updated_at = ts(10_000);
        assert_eq!(
            detect_conflict(&local, &remote(20_000), PROXIMITY),
            ConflictCheck::Conflict
        );
    }

    // ===========================================
    // Resolution Tests
    // ===========================================

    #[test]
    fn use_remote_takes_remote_content_clean() {
        let local = synced_local(100, 50);
        let resolved = apply_resolution(&local, &remote(80), Resolution::UseRemote, ts(200));

        assert_eq!(resolved.participant_count(), 1);
        assert!(!resolved.is_dirty());
        assert_eq!(resolved.last_sync_at, Some(ts(200)));
        assert_eq!(resolved.sync_version, 6);
    }

    #[test]
    fn use_local_keeps_content_and_stays_dirty() {
        let local = synced_local(100, 50);
        let resolved = apply_resolution(&local, &remote(80), Resolution::UseLocal, ts(200));

        assert_eq!(resolved.participant_count(), 0);
        assert!(resolved.is_dirty());
        assert_eq!(resolved.sync_version, 3);
        assert_eq!(resolved.updated_at, ts(100));
    }

    #[test]
    fn merge_keeps_content_adopts_remote_clock() {
        let local = synced_local(100, 50);
        let resolved = apply_resolution(&local, &remote(80), Resolution::Merge, ts(200));

        assert_eq!(resolved.participant_count(), 0);
        assert_eq!(resolved.updated_at, ts(80));
        assert_eq!(resolved.sync_version, 5);
        assert!(resolved.is_dirty());
    }

    #[test]
    fn merged_session_does_not_conflict_with_same_remote_again() {
        let local = synced_local(100, 50);
        let remote = remote(80);
        let merged = apply_resolution(&local, &remote, Resolution::Merge, ts(200));

        assert_eq!(merged.last_sync_at, Some(ts(80)));
        assert!(merged.is_dirty());
        assert_eq!(
            detect_conflict(&merged, &remote, PROXIMITY),
            ConflictCheck::KeepLocal
        );
    }

    #[test]
    fn reflag_dirty_survives_skewed_clock() {
        let local = synced_local(100, 500);
        let resolved = apply_resolution(&local, &remote(80), Resolution::UseLocal, ts(200));
        assert_eq!(resolved.local_modified_at, Some(ts(501)));
        assert!(resolved.is_dirty());
    }

    #[test]
    fn adopt_remote_without_local_bumps_remote_version() {
        let adopted = adopt_remote(None, &remote(80), ts(90));
        assert_eq!(adopted.sync_version, 6);
        assert!(!adopted.is_dirty());
    }
}
