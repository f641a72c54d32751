// error.rs — Error types for the in-memory store.

use thiserror::Error;
use tracker_audit::AuditError;
use tracker_core::EntryHandle;

#[derive(Debug, Error)]
pub enum MemoryError {
    /// The session has no entry with this handle.
    #[error("unknown entry {0}")]
    UnknownEntry(EntryHandle),

    /// The property is not declared on the entity.
    #[error("{entity_type} has no property '{property}'")]
    UnknownProperty {
        entity_type: String,
        property: String,
    },

    /// No stored row with this key.
    #[error("{entity_type} '{record_id}' not found")]
    NotFound {
        entity_type: String,
        record_id: String,
    },

    /// An insert collided with an existing row.
    #[error("duplicate key: {entity_type} '{record_id}' already exists")]
    DuplicateKey {
        entity_type: String,
        record_id: String,
    },

    /// A commit was told to fail (test hook).
    #[error("injected failure: {0}")]
    InjectedFailure(String),

    /// A key could not be turned into a record id.
    #[error(transparent)]
    Audit(#[from] AuditError),
}
