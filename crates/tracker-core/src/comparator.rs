// comparator.rs — Type-aware equality for change detection.
//
// A property only produces an audit detail when its comparator says the
// current and original values differ. Comparators exist so that storage
// round-trips do not look like edits: a timestamp that lost its sub-millisecond
// part, or an integer that came back as a float, is still the same value.
//
// Selection: exact kind registered → that comparator; complex kind → the
// member-wise comparator; anything else → the default (textual) comparator.

use std::collections::HashMap;
use std::sync::Arc;

use crate::value::{ComplexValue, Value, ValueKind};

/// Equality strategy for one declared property kind.
///
/// The registry is passed in so composite comparators can recurse.
pub trait Comparator: Send + Sync {
    fn are_equal(
        &self,
        registry: &ComparatorRegistry,
        current: Option<&Value>,
        original: Option<&Value>,
    ) -> bool;
}

/// Equal iff both are null or their text forms match.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultComparator;

impl Comparator for DefaultComparator {
    fn are_equal(
        &self,
        _registry: &ComparatorRegistry,
        current: Option<&Value>,
        original: Option<&Value>,
    ) -> bool {
        match (current, original) {
            (None, None) => true,
            (Some(a), Some(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

/// Compares timestamps at whole-millisecond precision.
#[derive(Debug, Clone, Copy, Default)]
pub struct DateTimeComparator;

impl Comparator for DateTimeComparator {
    fn are_equal(
        &self,
        registry: &ComparatorRegistry,
        current: Option<&Value>,
        original: Option<&Value>,
    ) -> bool {
        match (current, original) {
            (Some(Value::DateTime(a)), Some(Value::DateTime(b))) => {
                a.timestamp_millis() == b.timestamp_millis()
            }
            _ => DefaultComparator.are_equal(registry, current, original),
        }
    }
}

/// Compares Int and Float values numerically, across boxing.
#[derive(Debug, Clone, Copy)]
pub struct NumericComparator {
    /// Absolute tolerance, also applied relative to the larger magnitude.
    pub tolerance: f64,
}

/// Default tolerance for floating-point comparisons.
pub const FLOAT_TOLERANCE: f64 = 1e-9;

impl Default for NumericComparator {
    fn default() -> Self {
        Self {
            tolerance: FLOAT_TOLERANCE,
        }
    }
}

impl Comparator for NumericComparator {
    fn are_equal(
        &self,
        registry: &ComparatorRegistry,
        current: Option<&Value>,
        original: Option<&Value>,
    ) -> bool {
        match (current, original) {
            // Exact for integers; f64 would lose precision above 2^53.
            (Some(Value::Int(a)), Some(Value::Int(b))) => a == b,
            (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => {
                    let scale = x.abs().max(y.abs()).max(1.0);
                    (x - y).abs() <= self.tolerance * scale
                }
                _ => DefaultComparator.are_equal(registry, current, original),
            },
            _ => DefaultComparator.are_equal(registry, current, original),
        }
    }
}

/// Compares complex values sub-field by sub-field, choosing each
/// sub-field's comparator from the registry. Scalars handed to it are
/// delegated to their own kind's comparator.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberwiseComparator;

impl Comparator for MemberwiseComparator {
    fn are_equal(
        &self,
        registry: &ComparatorRegistry,
        current: Option<&Value>,
        original: Option<&Value>,
    ) -> bool {
        match (current, original) {
            (None, None) => true,
            (Some(Value::Complex(a)), Some(Value::Complex(b))) => {
                field_names(a, Some(b)).into_iter().all(|name| {
                    let (x, y) = (a.get(name), b.get(name));
                    match x.or(y) {
                        Some(v) => registry.comparator_for(&v.kind()).are_equal(registry, x, y),
                        None => true,
                    }
                })
            }
            (Some(v), _) | (None, Some(v)) if !v.kind().is_complex() => registry
                .comparator_for(&v.kind())
                .are_equal(registry, current, original),
            _ => false,
        }
    }
}

/// Sub-field names of `current`, followed by any only present in `original`.
pub(crate) fn field_names<'a>(
    current: &'a ComplexValue,
    original: Option<&'a ComplexValue>,
) -> Vec<&'a str> {
    let mut names: Vec<&str> = current.field_names().collect();
    if let Some(original) = original {
        for name in original.field_names() {
            if !names.contains(&name) {
                names.push(name);
            }
        }
    }
    names
}

/// Maps declared kinds to comparators. Never fails: unknown kinds get the
/// default comparator.
pub struct ComparatorRegistry {
    by_kind: HashMap<ValueKind, Arc<dyn Comparator>>,
    memberwise: Arc<dyn Comparator>,
    default: Arc<dyn Comparator>,
}

impl ComparatorRegistry {
    /// A registry with the built-in strategies.
    pub fn new() -> Self {
        let numeric: Arc<dyn Comparator> = Arc::new(NumericComparator::default());
        let mut by_kind: HashMap<ValueKind, Arc<dyn Comparator>> = HashMap::new();
        by_kind.insert(ValueKind::DateTime, Arc::new(DateTimeComparator));
        by_kind.insert(ValueKind::Int, numeric.clone());
        by_kind.insert(ValueKind::Float, numeric);

        Self {
            by_kind,
            memberwise: Arc::new(MemberwiseComparator),
            default: Arc::new(DefaultComparator),
        }
    }

    /// Register (or replace) the comparator for an exact kind. A complex
    /// kind registered here wins over the member-wise comparator.
    pub fn register(&mut self, kind: ValueKind, comparator: impl Comparator + 'static) {
        self.by_kind.insert(kind, Arc::new(comparator));
    }

    pub fn comparator_for(&self, kind: &ValueKind) -> Arc<dyn Comparator> {
        if let Some(comparator) = self.by_kind.get(kind) {
            return comparator.clone();
        }
        if kind.is_complex() {
            return self.memberwise.clone();
        }
        self.default.clone()
    }

    /// Shorthand for `comparator_for(kind).are_equal(self, ..)`.
    pub fn are_equal(
        &self,
        kind: &ValueKind,
        current: Option<&Value>,
        original: Option<&Value>,
    ) -> bool {
        self.comparator_for(kind).are_equal(self, current, original)
    }
}

impl Default for ComparatorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn registry() -> ComparatorRegistry {
        ComparatorRegistry::new()
    }

    fn address(city: &str, zip: i64) -> Value {
        Value::from(ComplexValue::new("Address").field("City", city).field("Zip", zip))
    }

    #[test]
    fn nulls() {
        let r = registry();
        assert!(r.are_equal(&ValueKind::Text, None, None));
        assert!(!r.are_equal(&ValueKind::Text, Some(&Value::from("a")), None));
        assert!(!r.are_equal(&ValueKind::Text, None, Some(&Value::from("a"))));
    }

    #[test]
    fn text_compares_by_value() {
        let r = registry();
        assert!(r.are_equal(&ValueKind::Text, Some(&Value::from("a")), Some(&Value::from("a"))));
        assert!(!r.are_equal(&ValueKind::Text, Some(&Value::from("a")), Some(&Value::from("b"))));
    }

    #[test]
    fn timestamps_ignore_sub_millisecond_noise() {
        let r = registry();
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let original = Value::from(t);
        let noisy = Value::from(t + Duration::microseconds(250));
        assert!(r.are_equal(&ValueKind::DateTime, Some(&noisy), Some(&original)));

        let later = Value::from(t + Duration::milliseconds(1));
        assert!(!r.are_equal(&ValueKind::DateTime, Some(&later), Some(&original)));
    }

    #[test]
    fn numbers_compare_across_boxing() {
        let r = registry();
        assert!(r.are_equal(&ValueKind::Float, Some(&Value::from(5)), Some(&Value::from(5.0))));
        let sum = Value::from(0.1 + 0.2);
        assert!(r.are_equal(&ValueKind::Float, Some(&sum), Some(&Value::from(0.3))));
        assert!(!r.are_equal(&ValueKind::Int, Some(&Value::from(5)), Some(&Value::from(6))));
        assert!(!r.are_equal(
            &ValueKind::Int,
            Some(&Value::from(i64::MAX)),
            Some(&Value::from(i64::MAX - 1))
        ));
    }

    #[test]
    fn complex_values_compare_member_wise() {
        let r = registry();
        let kind = ValueKind::Complex("Address".to_string());
        assert!(r.are_equal(&kind, Some(&address("A", 1)), Some(&address("A", 1))));
        assert!(!r.are_equal(&kind, Some(&address("B", 1)), Some(&address("A", 1))));
        assert!(!r.are_equal(&kind, Some(&address("A", 1)), None));
    }

    #[test]
    fn complex_numeric_fields_use_numeric_comparator() {
        let r = registry();
        let kind = ValueKind::Complex("Point".to_string());
        let a = Value::from(ComplexValue::new("Point").field("X", 1));
        let b = Value::from(ComplexValue::new("Point").field("X", 1.0));
        assert!(r.are_equal(&kind, Some(&a), Some(&b)));
    }

    #[test]
    fn memberwise_delegates_scalars_to_their_kind() {
        let r = registry();
        let memberwise = r.comparator_for(&ValueKind::Complex("Address".to_string()));
        assert!(memberwise.are_equal(&r, Some(&Value::from(2)), Some(&Value::from(2.0))));
        assert!(!memberwise.are_equal(&r, Some(&Value::from("x")), None));
    }

    #[test]
    fn structurally_identical_complex_values_are_equal_whatever_their_text() {
        // Same fields declared in a different order render differently but
        // compare equal.
        let r = registry();
        let a = Value::from(ComplexValue::new("Address").field("City", "A").field("Zip", 1));
        let b = Value::from(ComplexValue::new("Address").field("Zip", 1).field("City", "A"));
        assert_ne!(a.to_string(), b.to_string());
        assert!(r.are_equal(&ValueKind::Complex("Address".to_string()), Some(&a), Some(&b)));
    }

    struct CaseInsensitive;

    impl Comparator for CaseInsensitive {
        fn are_equal(&self, _: &ComparatorRegistry, a: Option<&Value>, b: Option<&Value>) -> bool {
            a.map(|v| v.to_string().to_lowercase()) == b.map(|v| v.to_string().to_lowercase())
        }
    }

    #[test]
    fn registered_comparator_wins() {
        let mut r = registry();
        r.register(ValueKind::Text, CaseInsensitive);
        let (upper, lower) = (Value::from("ABC"), Value::from("abc"));
        assert!(r.are_equal(&ValueKind::Text, Some(&upper), Some(&lower)));
    }

    #[test]
    fn unknown_kind_falls_back_to_default() {
        let r = registry();
        assert!(r.are_equal(&ValueKind::Uuid, Some(&Value::from("x")), Some(&Value::from("x"))));
    }
}
