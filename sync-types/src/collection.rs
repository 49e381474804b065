//! The remote collection family.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A remote collection mirrored by the realtime cache.
///
/// `Sessions` holds active-session documents; the cache only ever sees the
/// historical projection of it. The other three are read-mostly reference
/// collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    /// Players known to the app.
    Participants,
    /// Standing playing groups.
    Groups,
    /// Payment groupings (who settles with whom).
    PaymentGroupings,
    /// Session documents, active and historical.
    Sessions,
}

impl Collection {
    /// Every collection, in load-priority order.
    pub const ALL: [Collection; 4] = [
        Collection::Participants,
        Collection::Groups,
        Collection::PaymentGroupings,
        Collection::Sessions,
    ];

    /// The small reference collections needed before anything else works.
    pub const REFERENCE: [Collection; 3] = [
        Collection::Participants,
        Collection::Groups,
        Collection::PaymentGroupings,
    ];

    /// Remote collection name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Participants => "participants",
            Collection::Groups => "groups",
            Collection::PaymentGroupings => "paymentGroupings",
            Collection::Sessions => "sessions",
        }
    }

    /// Whether this is one of the small reference collections.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Collection::Sessions)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
