//! # tracker-audit
//!
//! Audit record model for change tracking.
//!
//! Every entity-level change that survives the tracking policy is recorded
//! as an [`AuditLog`] header. The header owns an ordered list of
//! [`AuditLogDetail`] records, one per property whose value actually changed
//! (or, for additions and deletions, one per tracked property).
//!
//! ## Quick Example
//!
//! ```rust
//! use tracker_audit::{AuditLog, AuditLogDetail, EventType};
//!
//! let log = AuditLog::new("shop::Order", EventType::Modified, "42")
//!     .with_username("alice")
//!     .with_details(vec![AuditLogDetail::new("Status", Some("open"), Some("paid"))]);
//! assert_eq!(log.details.len(), 1);
//! ```

pub mod error;
pub mod filter;
pub mod record;

pub use error::AuditError;
pub use filter::AuditLogFilter;
pub use record::{record_id_from_keys, AuditLog, AuditLogDetail, EventType, Metadata};
