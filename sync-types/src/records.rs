//! Reference and historical record types held by the realtime cache.
//!
//! The cache stores raw [`Document`]s; these types are the typed views
//! callers deserialize into.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::{Collection, Document, GroupId, SessionStatus, Timestamp, UserId};

/// A typed record that lives in one remote collection.
pub trait CollectionRecord: Serialize + DeserializeOwned {
    /// The collection this record type is read from.
    const COLLECTION: Collection;

    /// The record's document id.
    fn record_id(&self) -> &str;
}

/// Extract the `id` field of a cached document.
pub fn record_id(document: &Document) -> Option<&str> {
    document
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
}

/// A player known to the app.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Document id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Linked user account, if the player has one.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Inactive participants are hidden from new sessions.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl CollectionRecord for Participant {
    const COLLECTION: Collection = Collection::Participants;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// A standing playing group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Document id.
    pub id: String,
    /// Group name.
    pub name: String,
    /// Participants that usually play together.
    #[serde(default)]
    pub participant_ids: Vec<String>,
    /// Inactive groups are archived.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl CollectionRecord for Group {
    const COLLECTION: Collection = Collection::Groups;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Who settles with whom after a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentGrouping {
    /// Document id.
    pub id: String,
    /// Grouping name.
    pub name: String,
    /// Group the grouping belongs to.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    /// Participants sharing one wallet.
    #[serde(default)]
    pub participant_ids: Vec<String>,
    /// Inactive groupings are kept for history only.
    #[serde(default = "default_true")]
    pub active: bool,
}

impl CollectionRecord for PaymentGrouping {
    const COLLECTION: Collection = Collection::PaymentGroupings;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// Historical projection of a session document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    /// Document id.
    pub id: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: SessionStatus,
    /// Session owner.
    pub owner_id: UserId,
    /// Playing group.
    #[serde(default)]
    pub group_id: Option<GroupId>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last remote update.
    pub updated_at: Timestamp,
}

impl CollectionRecord for SessionSummary {
    const COLLECTION: Collection = Collection::Sessions;

    fn record_id(&self) -> &str {
        &self.id
    }
}

fn default_true() -> bool {
    true
}
