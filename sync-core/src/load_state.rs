//! Per-collection load status machine.
//!
//! `NotLoaded -> Loading -> Loaded -> Loading -> ...`, with `Error` entered
//! when a load fails. Whether a `Loaded` collection is fresh or stale is not
//! a separate state; it is derived from the load time and the freshness
//! window when asked.

use sync_types::Timestamp;

use crate::FreshnessWindow;

/// Load status of one collection - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LoadStatus {
    /// Never requested.
    #[default]
    NotLoaded,
    /// A load is running.
    Loading,
    /// Last load succeeded.
    Loaded {
        /// When the load completed.
        at: Timestamp,
    },
    /// Last load failed.
    Error {
        /// Failure description.
        message: String,
    },
}

/// Inputs to the load status machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadEvent {
    /// A load (initial, refresh or retry) started.
    Started,
    /// The load completed.
    Succeeded {
        /// Completion time.
        at: Timestamp,
    },
    /// The load failed.
    Failed {
        /// Failure description.
        message: String,
    },
}

/// Status as reported to callers, with freshness resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    /// Never requested.
    NotLoaded,
    /// A load is running.
    Loading,
    /// Loaded and inside the freshness window.
    Fresh,
    /// Loaded but the freshness window has elapsed.
    Stale,
    /// Last load failed.
    Error(String),
}

impl LoadStatus {
    /// Apply an event. Out-of-order events leave the status unchanged.
    pub fn on_event(self, event: LoadEvent) -> Self {
        match (self, event) {
            (_, LoadEvent::Started) => Self::Loading,
            (Self::Loading, LoadEvent::Succeeded { at }) => Self::Loaded { at },
            (Self::Loading, LoadEvent::Failed { message }) => Self::Error { message },
            (state, _) => state,
        }
    }

    /// Whether a load is running.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    /// Resolve freshness of a loaded collection.
    pub fn phase(&self, window: FreshnessWindow, now: Timestamp) -> LoadPhase {
        match self {
            Self::NotLoaded => LoadPhase::NotLoaded,
            Self::Loading => LoadPhase::Loading,
            Self::Loaded { at } => {
                if now.duration_since(*at) < window.duration() {
                    LoadPhase::Fresh
                } else {
                    LoadPhase::Stale
                }
            }
            Self::Error { message } => LoadPhase::Error(message.clone()),
        }
    }
}
