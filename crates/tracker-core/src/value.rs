// value.rs — Property values as the tracker sees them.
//
// The persistence session reports each property as a declared `ValueKind`
// plus an optional `Value` (None is SQL NULL). Complex (nested) properties
// carry their sub-fields in declaration order so they can be flattened into
// `<property>_<field>` audit details.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The declared type of a property; selects its comparator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "type_name", rename_all = "snake_case")]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    DateTime,
    Uuid,
    /// A nested value object, identified by its type name.
    Complex(String),
}

impl ValueKind {
    pub fn is_complex(&self) -> bool {
        matches!(self, ValueKind::Complex(_))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Bool => write!(f, "bool"),
            ValueKind::Int => write!(f, "int"),
            ValueKind::Float => write!(f, "float"),
            ValueKind::Text => write!(f, "text"),
            ValueKind::DateTime => write!(f, "datetime"),
            ValueKind::Uuid => write!(f, "uuid"),
            ValueKind::Complex(name) => write!(f, "complex:{}", name),
        }
    }
}

/// A non-null property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    DateTime(DateTime<Utc>),
    Uuid(Uuid),
    Complex(ComplexValue),
}

impl Value {
    /// The kind this value naturally has.
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::Text(_) => ValueKind::Text,
            Value::DateTime(_) => ValueKind::DateTime,
            Value::Uuid(_) => ValueKind::Uuid,
            Value::Complex(c) => ValueKind::Complex(c.type_name.clone()),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of Int and Float values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_complex(&self) -> Option<&ComplexValue> {
        match self {
            Value::Complex(c) => Some(c),
            _ => None,
        }
    }
}

/// Text form stored in audit details.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
            Value::DateTime(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Complex(c) => write!(f, "{}", c),
        }
    }
}

/// Text form of an optional value; `None` stays `None`.
pub fn to_text(value: Option<&Value>) -> Option<String> {
    value.map(ToString::to_string)
}

/// Null or empty text. Used to skip blank values on add/delete.
pub fn is_empty(value: Option<&Value>) -> bool {
    match value {
        None => true,
        Some(Value::Text(s)) => s.is_empty(),
        Some(_) => false,
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTime(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<ComplexValue> for Value {
    fn from(v: ComplexValue) -> Self {
        Value::Complex(v)
    }
}

/// A nested value object: a type name plus named sub-fields in declaration
/// order. Sub-fields may themselves be complex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexValue {
    pub type_name: String,
    pub fields: Vec<(String, Option<Value>)>,
}

impl ComplexValue {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            fields: Vec::new(),
        }
    }

    /// Add (or replace) a sub-field and return self (builder pattern).
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, Some(value.into()));
        self
    }

    /// Add (or replace) a null sub-field.
    pub fn null_field(mut self, name: impl Into<String>) -> Self {
        self.set(name, None);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: Option<Value>) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.as_ref())
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Display for ComplexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {{", self.type_name)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match value {
                Some(v) => write!(f, " {}: {}", name, v)?,
                None => write!(f, " {}: null", name)?,
            }
        }
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn display_forms() {
        assert_eq!(Value::from(5).to_string(), "5");
        assert_eq!(Value::from(true).to_string(), "true");
        assert_eq!(Value::from("abc").to_string(), "abc");
        let dt = Utc.with_ymd_and_hms(2015, 5, 5, 0, 0, 0).unwrap();
        assert_eq!(Value::from(dt).to_string(), "2015-05-05T00:00:00Z");
    }

    #[test]
    fn complex_display_lists_fields_in_order() {
        let address = ComplexValue::new("Address")
            .field("City", "A")
            .null_field("Zip");
        assert_eq!(address.to_string(), "Address { City: A, Zip: null }");
    }

    #[test]
    fn complex_set_replaces_existing_field() {
        let mut address = ComplexValue::new("Address").field("City", "A");
        address.set("City", Some(Value::from("B")));
        assert_eq!(address.fields.len(), 1);
        assert_eq!(address.get("City"), Some(&Value::from("B")));
        assert!(address.get("Zip").is_none());
    }

    #[test]
    fn value_kind_of_complex_carries_type_name() {
        let v = Value::from(ComplexValue::new("Address"));
        assert_eq!(v.kind(), ValueKind::Complex("Address".to_string()));
        assert!(v.kind().is_complex());
    }

    #[test]
    fn emptiness() {
        assert!(is_empty(None));
        assert!(is_empty(Some(&Value::from(""))));
        assert!(!is_empty(Some(&Value::from(0))));
        assert!(!is_empty(Some(&Value::from(false))));
    }
}
