//! # tracker-core
//!
//! Commit-time change auditing for a persistence session.
//!
//! A [`Tracker`] wraps a session's commit. Before the commit it diffs every
//! modified, soft-deleted and deleted entity and queues one [`AuditLog`]
//! header (with field-level details) per entity alongside the domain rows.
//! Inserted entities are audited after the commit, once storage has assigned
//! their keys, and written by a second, audit-only commit.
//!
//! ## Key components
//!
//! - [`Tracker`] — the two-phase orchestrator (blocking and async forms)
//! - [`PersistenceSession`] / [`AsyncPersistenceSession`] — the unit-of-work
//!   seam a storage layer implements
//! - [`DetailGenerator`] — lazy per-entry detail sequence
//! - [`ComparatorRegistry`] — type-aware equality (timestamps at millisecond
//!   precision, numbers across boxing, complex values member-wise)
//! - [`EventDispatcher`] — post-save notification to [`NotificationSink`]s
//!
//! [`AuditLog`]: tracker_audit::AuditLog

pub mod accessor;
pub mod comparator;
pub mod cycle;
pub mod details;
pub mod error;
pub mod events;
pub mod identity;
pub mod session;
pub mod tracker;
pub mod value;

pub use accessor::EntryValues;
pub use comparator::{
    Comparator, ComparatorRegistry, DateTimeComparator, DefaultComparator, MemberwiseComparator,
    NumericComparator, FLOAT_TOLERANCE,
};
pub use cycle::{CommitCycle, CommitPhase};
pub use details::{DetailContext, DetailGenerator};
pub use error::{SessionError, TrackerError};
pub use events::{AuditLogGenerated, EventDispatcher, FnSink, JsonlSink, NotificationSink, SinkId};
pub use identity::{IdentityConfig, MetadataFiller, UsernameFactory};
pub use session::{
    AsyncPersistenceSession, EntityEntry, EntityState, EntryHandle, PersistenceSession,
    PropertySlot, PropertyValues,
};
pub use tracker::Tracker;
pub use value::{ComplexValue, Value, ValueKind};
