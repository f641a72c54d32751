// record.rs — Audit header/detail data model.
//
// One AuditLog is written per entity-level change (an insert, an update, a
// soft delete, ...). It owns the field-level AuditLogDetail records; a detail
// never exists without its header.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AuditError;

/// Caller-supplied metadata attached verbatim to every header of a cycle.
///
/// `BTreeMap` keeps the keys ordered so stored metadata is deterministic.
pub type Metadata = BTreeMap<String, String>;

/// What happened to the entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// The entity was inserted.
    Added,
    /// One or more properties of an existing entity changed.
    Modified,
    /// The entity's soft-delete flag went from false to true.
    SoftDeleted,
    /// The entity's soft-delete flag went from true to false.
    UnDeleted,
    /// The entity was physically removed.
    Deleted,
}

impl EventType {
    /// Whether details for this event are produced by per-property change
    /// detection (as opposed to dumping every tracked value wholesale).
    pub fn is_change_detected(self) -> bool {
        matches!(
            self,
            EventType::Modified | EventType::SoftDeleted | EventType::UnDeleted
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Added => write!(f, "added"),
            EventType::Modified => write!(f, "modified"),
            EventType::SoftDeleted => write!(f, "soft_deleted"),
            EventType::UnDeleted => write!(f, "un_deleted"),
            EventType::Deleted => write!(f, "deleted"),
        }
    }
}

/// One field-level difference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditLogDetail {
    /// Property name; nested fields are qualified as `<property>_<field>`.
    pub property_name: String,

    /// Value before the change, as text. `None` for additions.
    pub original_value: Option<String>,

    /// Value after the change, as text. `None` for deletions.
    pub new_value: Option<String>,
}

impl AuditLogDetail {
    pub fn new(
        property_name: impl Into<String>,
        original_value: Option<impl Into<String>>,
        new_value: Option<impl Into<String>>,
    ) -> Self {
        Self {
            property_name: property_name.into(),
            original_value: original_value.map(Into::into),
            new_value: new_value.map(Into::into),
        }
    }
}

/// One entity-level change event (the audit header).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLog {
    /// Unique identifier for this header.
    pub audit_log_id: Uuid,

    /// Fully qualified entity type name (e.g. "shop::Order").
    pub entity_type: String,

    /// What kind of change this header records.
    pub event_type: EventType,

    /// Primary-key representation of the changed record.
    pub record_id: String,

    /// Acting user, when one could be resolved.
    pub username: Option<String>,

    /// When the change was audited (UTC).
    pub event_date_utc: DateTime<Utc>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Field-level differences, in property declaration order.
    #[serde(default)]
    pub details: Vec<AuditLogDetail>,
}

impl AuditLog {
    /// Create a header with the current timestamp, a random id, no user,
    /// no metadata and no details.
    pub fn new(
        entity_type: impl Into<String>,
        event_type: EventType,
        record_id: impl Into<String>,
    ) -> Self {
        Self {
            audit_log_id: Uuid::new_v4(),
            entity_type: entity_type.into(),
            event_type,
            record_id: record_id.into(),
            username: None,
            event_date_utc: Utc::now(),
            metadata: Metadata::new(),
            details: Vec::new(),
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_details(mut self, details: Vec<AuditLogDetail>) -> Self {
        self.details = details;
        self
    }

    /// Look up the detail recorded for a (qualified) property name.
    pub fn detail(&self, property_name: &str) -> Option<&AuditLogDetail> {
        self.details
            .iter()
            .find(|d| d.property_name == property_name)
    }
}

/// Build the record id for an entity from its key values, in key
/// declaration order. Composite keys are joined with `_`.
pub fn record_id_from_keys(
    entity_type: &str,
    keys: &[(&str, Option<String>)],
) -> Result<String, AuditError> {
    if keys.is_empty() {
        return Err(AuditError::NoKeyProperties(entity_type.to_string()));
    }

    let mut parts = Vec::with_capacity(keys.len());
    for (property, value) in keys {
        match value {
            Some(v) => parts.push(v.as_str()),
            None => {
                return Err(AuditError::MissingKeyValue {
                    entity_type: entity_type.to_string(),
                    property: property.to_string(),
                })
            }
        }
    }
    Ok(parts.join("_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_serialization_round_trip() {
        let mut metadata = Metadata::new();
        metadata.insert("ip".to_string(), "10.0.0.1".to_string());
        let log = AuditLog::new("blog::Post", EventType::SoftDeleted, "7")
            .with_username("bob")
            .with_metadata(metadata)
            .with_details(vec![AuditLogDetail::new(
                "IsDeleted",
                Some("false"),
                Some("true"),
            )]);

        let json = serde_json::to_string(&log).expect("serialize");
        let restored: AuditLog = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(log, restored);
    }

    #[test]
    fn event_type_serializes_as_snake_case() {
        let json = serde_json::to_string(&EventType::UnDeleted).unwrap();
        assert_eq!(json, "\"un_deleted\"");
    }

    #[test]
    fn only_modification_family_is_change_detected() {
        assert!(EventType::Modified.is_change_detected());
        assert!(EventType::SoftDeleted.is_change_detected());
        assert!(EventType::UnDeleted.is_change_detected());
        assert!(!EventType::Added.is_change_detected());
        assert!(!EventType::Deleted.is_change_detected());
    }

    #[test]
    fn detail_lookup_by_name() {
        let log = AuditLog::new("x::X", EventType::Added, "1").with_details(vec![
            AuditLogDetail::new("Id", None::<String>, Some("1")),
            AuditLogDetail::new("Name", None::<String>, Some("n")),
        ]);
        assert_eq!(log.detail("Name").unwrap().new_value.as_deref(), Some("n"));
        assert!(log.detail("Missing").is_none());
    }

    #[test]
    fn composite_record_id_joins_in_order() {
        let id = record_id_from_keys(
            "x::Pair",
            &[("Key1", Some("a".to_string())), ("Key2", Some("b".to_string()))],
        )
        .unwrap();
        assert_eq!(id, "a_b");
    }

    #[test]
    fn missing_key_value_is_rejected() {
        let err = record_id_from_keys("x::X", &[("Id", None)]).unwrap_err();
        assert!(matches!(
            err,
            AuditError::MissingKeyValue { ref property, .. } if property == "Id"
        ));
    }

    #[test]
    fn keyless_entity_is_rejected() {
        assert!(matches!(
            record_id_from_keys("x::X", &[]),
            Err(AuditError::NoKeyProperties(_))
        ));
    }
}
