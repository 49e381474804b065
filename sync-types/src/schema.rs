//! Document schema for session entities.
//!
//! Encoding goes through [`ActiveSession::to_document`], which first
//! normalizes malformed optional fields instead of rejecting them. Only a
//! broken *required* field (an empty owner) fails.

use serde_json::{Map, Value};
use std::fmt;

use crate::{normalize_dates, ActiveSession, SchemaError, SessionId};

/// A remote document: a JSON object keyed by field name.
///
/// `serde_json::Map` is ordered by key, so two documents compare equal
/// regardless of the field order the remote returned them in.
pub type Document = Map<String, Value>;

/// An optional field that [`ActiveSession::normalize`] rewrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedField(pub &'static str);

impl fmt::Display for NormalizedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl ActiveSession {
    /// Normalize malformed optional fields in place.
    ///
    /// Returns the fields that were rewritten, for logging.
    pub fn normalize(&mut self) -> Vec<NormalizedField> {
        let mut fixed = Vec::new();

        if let Some(notes) = &self.notes {
            let trimmed = notes.trim();
            if trimmed.is_empty() {
                self.notes = None;
                fixed.push(NormalizedField("notes"));
            } else if trimmed.len() != notes.len() {
                self.notes = Some(trimmed.to_string());
                fixed.push(NormalizedField("notes"));
            }
        }

        if self.group_id.as_ref().is_some_and(|g| g.as_str().trim().is_empty()) {
            self.group_id = None;
            fixed.push(NormalizedField("groupId"));
        }

        if self.financials.currency.trim().is_empty() {
            self.financials.currency = "EUR".to_string();
            fixed.push(NormalizedField("financials.currency"));
        }
        if self.financials.buy_in_cents < 0 {
            self.financials.buy_in_cents = 0;
            fixed.push(NormalizedField("financials.buyInCents"));
        }
        if self.financials.rebuy_cents.is_some_and(|c| c <= 0) {
            self.financials.rebuy_cents = None;
            fixed.push(NormalizedField("financials.rebuyCents"));
        }
        if self
            .financials
            .payment_grouping_id
            .as_ref()
            .is_some_and(|id| id.trim().is_empty())
        {
            self.financials.payment_grouping_id = None;
            fixed.push(NormalizedField("financials.paymentGroupingId"));
        }

        for participant in &mut self.participants {
            if participant.cash_out_cents.is_some_and(|c| c < 0) {
                participant.cash_out_cents = None;
                fixed.push(NormalizedField("participants.cashOutCents"));
            }
            if participant.seat == Some(0) {
                participant.seat = None;
                fixed.push(NormalizedField("participants.seat"));
            }
        }

        if !self.access.contains(&self.owner_id) {
            self.access.insert(0, self.owner_id.clone());
            fixed.push(NormalizedField("access"));
        }
        let before = self.access.len();
        let mut seen = std::collections::HashSet::new();
        self.access.retain(|user| seen.insert(user.clone()));
        if self.access.len() != before {
            fixed.push(NormalizedField("access"));
        }

        fixed
    }

    /// Encode into a remote document.
    ///
    /// The `id` never appears in the body; it is the document key.
    pub fn to_document(&self) -> Result<Document, SchemaError> {
        if self.owner_id.as_str().trim().is_empty() {
            return Err(SchemaError::InvalidField {
                field: "ownerId",
                reason: "must not be empty".into(),
            });
        }

        let mut normalized = self.clone();
        normalized.normalize();
        normalized.id = None;

        match serde_json::to_value(&normalized).map_err(SchemaError::Serialization)? {
            Value::Object(map) => Ok(map),
            _ => Err(SchemaError::NotAnObject),
        }
    }

    /// Decode a remote document, binding it to `id`.
    ///
    /// Remote timestamp objects are normalized to milliseconds first.
    pub fn from_document(id: &SessionId, document: Document) -> Result<Self, SchemaError> {
        let mut value = Value::Object(document);
        normalize_dates(&mut value);
        let mut session: ActiveSession =
            serde_json::from_value(value).map_err(SchemaError::Deserialization)?;
        session.id = Some(id.clone());
        Ok(session)
    }
}
