//! Error types for kitty-sync documents.

use thiserror::Error;

/// Errors that can occur while encoding or decoding documents.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),

    /// Document did not encode to a JSON object
    #[error("document is not an object")]
    NotAnObject,

    /// Record has no usable `id` field
    #[error("record has no id")]
    MissingId,

    /// A required field holds a value that cannot be normalized
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        /// Field name as it appears in the document.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}
