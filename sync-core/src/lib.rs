//! # sync-core
//!
//! Pure logic for kitty-sync (no I/O, instant tests).
//!
//! This crate implements the decisions behind offline-first session sync
//! without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (remote store, local storage, timers) is performed by
//! `sync-client`, which acts on the answers these modules give.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod change;
pub mod conflict;
pub mod debounce;
pub mod dedupe;
pub mod freshness;
pub mod load_state;
pub mod markers;
pub mod pending;
pub mod reachability;

pub use change::{check_transition, classify_change, ChangeKind, IllegalTransition, SignificantReason};
pub use conflict::{adopt_remote, apply_resolution, detect_conflict, ConflictCheck, Resolution};
pub use debounce::{DebouncePolicy, DEFAULT_FIRST_CREATE_DELAY, DEFAULT_PERSISTED_DELAY};
pub use dedupe::{DuplicateGuard, DEFAULT_DUPLICATE_WINDOW};
pub use freshness::{FreshnessWindow, DEFAULT_FRESHNESS_WINDOW};
pub use load_state::{LoadEvent, LoadPhase, LoadStatus};
pub use markers::{
    marker_key, parse_marker_key, MarkerPolicy, DEFAULT_MARKER_RETAIN, DEFAULT_MARKER_THRESHOLD,
    MARKER_PREFIX,
};
pub use pending::PendingChanges;
pub use reachability::{
    NetworkState, Reachability, ReachabilityAction, ReachabilityEvent, DEFAULT_RECONNECT_COOLDOWN,
};
