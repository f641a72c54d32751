// filter.rs — Selecting stored audit logs.
//
// Storage backends answer "all logs for this entity type" and "all logs for
// this one record" by running their logs through an AuditLogFilter.

use serde::{Deserialize, Serialize};

use crate::record::AuditLog;

/// Criteria for selecting audit logs. Empty criteria match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLogFilter {
    /// Only logs for this fully qualified entity type.
    pub entity_type: Option<String>,

    /// Only logs for this record id (usually combined with `entity_type`).
    pub record_id: Option<String>,
}

impl AuditLogFilter {
    /// Match every log.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match all logs of one entity type.
    pub fn for_entity(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            record_id: None,
        }
    }

    /// Match the logs of one record of one entity type.
    pub fn for_record(entity_type: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            entity_type: Some(entity_type.into()),
            record_id: Some(record_id.into()),
        }
    }

    pub fn matches(&self, log: &AuditLog) -> bool {
        let entity_ok = self
            .entity_type
            .as_deref()
            .map_or(true, |t| t == log.entity_type);
        let record_ok = self
            .record_id
            .as_deref()
            .map_or(true, |r| r == log.record_id);
        entity_ok && record_ok
    }
}
