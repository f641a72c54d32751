// error.rs — Error types for the audit record model.

use thiserror::Error;

/// Errors that can occur while building or encoding audit records.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A primary-key property had no value when the record id was built.
    /// Additions only get their key after the primary commit, so this
    /// usually means an addition was audited too early.
    #[error("key property '{property}' of {entity_type} has no value")]
    MissingKeyValue {
        entity_type: String,
        property: String,
    },

    /// The entity declares no key properties at all.
    #[error("entity type {0} declares no key properties")]
    NoKeyProperties(String),
}
