//! # sync-types
//!
//! Entity, record and document schema types for kitty-sync.
//!
//! This crate provides the foundational types used across all kitty-sync crates:
//! - [`SessionId`], [`UserId`], [`GroupId`] - Identity types
//! - [`Timestamp`] - Millisecond wall-clock time, plus remote date normalization
//! - [`Collection`] - The remote collection family
//! - [`ActiveSession`] - The single mutable session a device owns, with its
//!   explicit document schema
//! - [`Participant`], [`Group`], [`PaymentGrouping`], [`SessionSummary`] -
//!   Read-mostly reference and historical records
//! - [`SchemaError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod collection;
mod error;
mod ids;
mod records;
mod schema;
mod session;
mod time;

pub use collection::Collection;
pub use error::SchemaError;
pub use ids::{GroupId, SessionId, UserId};
pub use records::{
    record_id, CollectionRecord, Group, Participant, PaymentGrouping, SessionSummary,
};
pub use schema::{Document, NormalizedField};
pub use session::{
    ActiveSession, FinancialConfig, ParticipantResult, SessionParticipant, SessionStatus,
};
pub use time::{normalize_dates, Timestamp};
