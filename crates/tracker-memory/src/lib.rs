//! # tracker-memory
//!
//! An in-memory persistence layer for the change tracker.
//!
//! [`MemoryDatabase`] holds committed rows, generates integer identities on
//! insert and keeps the audit-log table. [`MemorySession`] is a unit of work
//! against it that implements both
//! [`PersistenceSession`](tracker_core::PersistenceSession) and
//! [`AsyncPersistenceSession`](tracker_core::AsyncPersistenceSession), so a
//! [`Tracker`](tracker_core::Tracker) can audit its commits.

pub mod database;
pub mod error;
pub mod record;
pub mod session;

pub use database::MemoryDatabase;
pub use error::MemoryError;
pub use record::EntityRecord;
pub use session::MemorySession;
