// record.rs — One entity row: type, key declaration and property values.

use tracker_audit::record_id_from_keys;
use tracker_core::{PropertyValues, Value, ValueKind};
use tracker_policy::Trackable;

use crate::error::MemoryError;

/// A row of some entity type, as stored and as handed to a session.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    pub entity_type: String,

    /// Key property names in declaration order.
    pub key_properties: Vec<String>,

    /// Integer key filled in by storage on insert when left null.
    pub identity: Option<String>,

    pub values: PropertyValues,
}

impl EntityRecord {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            key_properties: Vec::new(),
            identity: None,
            values: PropertyValues::new(),
        }
    }

    /// A record of a type that declares its own annotations.
    pub fn of<T: Trackable>() -> Self {
        Self::new(T::ENTITY_TYPE)
    }

    /// Declare a key property (builder pattern).
    pub fn key(mut self, name: impl Into<String>, kind: ValueKind, value: Option<Value>) -> Self {
        let name = name.into();
        self.key_properties.push(name.clone());
        self.values = self.values.with(name, kind, value);
        self
    }

    /// Declare a store-generated integer key. Leave it null to have the
    /// store assign the next value on insert.
    pub fn identity_key(mut self, name: impl Into<String>, value: Option<i64>) -> Self {
        let name = name.into();
        self.identity = Some(name.clone());
        self.key(name, ValueKind::Int, value.map(Value::from))
    }

    /// Declare a non-key property (builder pattern).
    pub fn property(
        mut self,
        name: impl Into<String>,
        kind: ValueKind,
        value: Option<Value>,
    ) -> Self {
        self.values = self.values.with(name, kind, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn key_values(&self) -> Vec<(&str, Option<String>)> {
        self.key_properties
            .iter()
            .map(|k| (k.as_str(), self.values.get(k).map(ToString::to_string)))
            .collect()
    }

    /// Storage key, joined the same way audit record ids are.
    pub fn record_id(&self) -> Result<String, MemoryError> {
        Ok(record_id_from_keys(&self.entity_type, &self.key_values())?)
    }

    /// Whether storage still has to generate the identity value.
    pub(crate) fn needs_identity(&self) -> bool {
        self.identity
            .as_deref()
            .is_some_and(|name| self.values.get(name).is_none())
    }
}
