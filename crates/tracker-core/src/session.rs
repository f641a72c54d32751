// session.rs — The persistence session contract.
//
// The tracker never talks to storage directly. A session (unit of work)
// reports the entities it is about to write, lets the tracker queue audit
// records alongside them, and performs the physical commit.
//
// Entries are owned snapshots rather than live references: the tracker reads
// them before the commit, keeps only their handles for pending additions,
// and asks for fresh snapshots after the commit has assigned identities.

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracker_audit::AuditLog;

use crate::error::SessionError;
use crate::value::{Value, ValueKind};

/// Stable identifier of an entry within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryHandle(pub u64);

impl fmt::Display for EntryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Change state of a tracked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    Unchanged,
    Added,
    Modified,
    Deleted,
}

/// One declared property: name, declared kind and value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySlot {
    pub name: String,
    pub kind: ValueKind,
    pub value: Option<Value>,
}

/// The declared properties of an entity, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyValues {
    slots: Vec<PropertySlot>,
}

impl PropertyValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a property with a value (builder pattern).
    pub fn with(mut self, name: impl Into<String>, kind: ValueKind, value: Option<Value>) -> Self {
        let name = name.into();
        match self.slots.iter_mut().find(|s| s.name == name) {
            Some(slot) => {
                slot.kind = kind;
                slot.value = value;
            }
            None => self.slots.push(PropertySlot { name, kind, value }),
        }
        self
    }

    /// Replace the value of a declared property. Returns false if the
    /// property is not declared.
    pub fn set(&mut self, name: &str, value: Option<Value>) -> bool {
        match self.slots.iter_mut().find(|s| s.name == name) {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.slot(name).and_then(|s| s.value.as_ref())
    }

    pub fn kind(&self, name: &str) -> Option<&ValueKind> {
        self.slot(name).map(|s| &s.kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slot(name).is_some()
    }

    pub fn slot(&self, name: &str) -> Option<&PropertySlot> {
        self.slots.iter().find(|s| s.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.name.as_str())
    }

    pub fn slots(&self) -> &[PropertySlot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Snapshot of one tracked entity as the session sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEntry {
    pub handle: EntryHandle,

    /// Fully qualified entity type name.
    pub entity_type: String,

    pub state: EntityState,

    /// Primary-key property names, in key declaration order.
    pub key_properties: Vec<String>,

    /// Values as loaded (the live pre-change snapshot).
    pub original_values: PropertyValues,

    /// Values as they will be written.
    pub current_values: PropertyValues,

    /// Properties the session marks as modified.
    pub modified_properties: BTreeSet<String>,
}

impl EntityEntry {
    pub fn is_modified(&self, property_name: &str) -> bool {
        self.modified_properties.contains(property_name)
    }

    /// Declared kind of a property, looked up in current then original values.
    pub fn property_kind(&self, property_name: &str) -> Option<&ValueKind> {
        self.current_values
            .kind(property_name)
            .or_else(|| self.original_values.kind(property_name))
    }

    pub fn is_complex(&self, property_name: &str) -> bool {
        self.property_kind(property_name)
            .is_some_and(ValueKind::is_complex)
    }

    /// Key values in key order, from current values (falling back to the
    /// original snapshot, e.g. for deleted entries).
    pub fn key_values(&self) -> Vec<(&str, Option<String>)> {
        self.key_properties
            .iter()
            .map(|k| {
                let value = self
                    .current_values
                    .get(k)
                    .or_else(|| self.original_values.get(k));
                (k.as_str(), value.map(ToString::to_string))
            })
            .collect()
    }
}

/// A unit of work the tracker can audit.
pub trait PersistenceSession {
    /// Entries with pending changes (state other than Unchanged), in the
    /// order the session tracks them.
    fn changed_entries(&self) -> Vec<EntityEntry>;

    /// Fresh snapshot of one entry, if the session still tracks it.
    fn entry(&self, handle: EntryHandle) -> Option<EntityEntry>;

    /// The entity's values as currently stored, read from storage. `None`
    /// when no stored row exists.
    fn database_values(&self, entry: &EntityEntry) -> Result<Option<PropertyValues>, SessionError>;

    /// Queue audit records to be written by the next commit.
    fn add_audit_logs(&mut self, logs: Vec<AuditLog>);

    /// Withdraw every queued audit record that has not been committed yet.
    fn discard_audit_logs(&mut self) -> Vec<AuditLog>;

    /// Physically write all pending changes. Returns the number of
    /// rows/records written.
    fn save_changes(&mut self) -> Result<usize, SessionError>;
}

/// A session that can also commit without blocking.
#[async_trait]
pub trait AsyncPersistenceSession: PersistenceSession + Send {
    /// Non-blocking form of [`PersistenceSession::save_changes`].
    async fn save_changes_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<usize, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> EntityEntry {
        let original = PropertyValues::new()
            .with("Key1", ValueKind::Text, Some(Value::from("a")))
            .with("Key2", ValueKind::Int, Some(Value::from(2)))
            .with("Name", ValueKind::Text, Some(Value::from("old")));
        let mut current = original.clone();
        current.set("Name", Some(Value::from("new")));
        EntityEntry {
            handle: EntryHandle(1),
            entity_type: "x::Pair".to_string(),
            state: EntityState::Modified,
            key_properties: vec!["Key1".to_string(), "Key2".to_string()],
            original_values: original,
            current_values: current,
            modified_properties: ["Name".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn key_values_follow_key_order() {
        let e = entry();
        assert_eq!(
            e.key_values(),
            vec![("Key1", Some("a".to_string())), ("Key2", Some("2".to_string()))]
        );
    }

    #[test]
    fn set_only_touches_declared_properties() {
        let mut values = PropertyValues::new().with("A", ValueKind::Int, None);
        assert!(values.set("A", Some(Value::from(1))));
        assert!(!values.set("B", Some(Value::from(1))));
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("A"), Some(&Value::from(1)));
    }

    #[test]
    fn modified_flags_and_kinds() {
        let e = entry();
        assert!(e.is_modified("Name"));
        assert!(!e.is_modified("Key1"));
        assert_eq!(e.property_kind("Key2"), Some(&ValueKind::Int));
        assert!(!e.is_complex("Name"));
    }
}
