// error.rs — Error types for the tracker core.
//
// `SessionError` is what a persistence session reports; `TrackerError` is
// what a save cycle reports to its caller. Session errors are wrapped
// transparently so the caller sees the same failure an un-audited commit
// would have produced.

use thiserror::Error;
use tracker_audit::AuditError;

use crate::session::EntryHandle;

/// Failures reported by a persistence session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The underlying write failed; nothing from this commit was persisted.
    #[error("commit failed: {0}")]
    CommitFailed(String),

    /// The session observed cancellation while committing.
    #[error("commit cancelled")]
    Cancelled,

    /// Reading the stored snapshot of an entity failed.
    #[error("failed to read stored values of {entity_type}: {reason}")]
    ReadFailed { entity_type: String, reason: String },
}

/// Errors surfaced by a save cycle.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Any failure from the persistence session, passed through unchanged.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Cancellation was requested before the cycle started.
    #[error("save cancelled before any audit work started")]
    Cancelled,

    /// A pending addition could not be found again after the primary commit.
    #[error("entry {0} is no longer tracked by the session")]
    MissingEntry(EntryHandle),

    /// An audit record could not be built (e.g. a key without a value).
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The commit cycle tried to move between phases in the wrong order.
    #[error("invalid commit phase transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A file I/O operation failed (notification sinks).
    #[error("I/O error at {path}: {source}")]
    IoError {
        path: String,
        source: std::io::Error,
    },

    /// Failed to serialize an event.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
