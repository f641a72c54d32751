// details.rs — Field-level audit detail generation for one entry.
//
// For change-detected events (Modified, SoftDeleted, UnDeleted) a detail is
// produced for a property only when:
//   - the policy tracks the property for the entry's entity type,
//   - the entry is in Modified state and the session marks the property
//     modified,
//   - and the property's comparator says current != original.
// Complex properties are flattened into one detail per differing sub-field,
// named `<property>_<field>`. In disconnected mode they are skipped, since
// storage gives no original to compare against.
//
// Added and Deleted events are captured wholesale: every tracked property is
// recorded as `None → current` or `original → None`.
//
// The generator is a plain iterator: lazy, finite, and consumed once.

use std::collections::VecDeque;

use tracker_audit::{AuditLogDetail, EventType};
use tracker_policy::{PropertyTrackingKey, TrackingConfig, TrackingPolicy};

use crate::accessor::EntryValues;
use crate::comparator::{field_names, ComparatorRegistry};
use crate::error::TrackerError;
use crate::session::EntityState;
use crate::value::{is_empty, to_text, Value, ValueKind};

/// Shared, read-only inputs of detail generation.
#[derive(Clone, Copy)]
pub struct DetailContext<'a> {
    pub policy: &'a TrackingPolicy,
    pub comparators: &'a ComparatorRegistry,
    pub config: TrackingConfig,
}

/// Lazily yields the audit details of one entry for one event type.
pub struct DetailGenerator<'a> {
    values: EntryValues<'a>,
    event_type: EventType,
    ctx: DetailContext<'a>,
    names: std::vec::IntoIter<String>,
    pending: VecDeque<AuditLogDetail>,
    failed: bool,
}

impl<'a> DetailGenerator<'a> {
    pub fn new(values: EntryValues<'a>, event_type: EventType, ctx: DetailContext<'a>) -> Self {
        let entry = values.entry();
        // Additions have no meaningful original snapshot; everything else
        // only diffs properties that existed before the change.
        let source = if event_type == EventType::Added {
            &entry.current_values
        } else {
            &entry.original_values
        };
        let names: Vec<String> = source.names().map(str::to_string).collect();

        Self {
            values,
            event_type,
            ctx,
            names: names.into_iter(),
            pending: VecDeque::new(),
            failed: false,
        }
    }

    /// Queue the details (if any) for one property.
    fn visit(&mut self, name: &str) -> Result<(), TrackerError> {
        let entry = self.values.entry();
        let key = PropertyTrackingKey::new(name, entry.entity_type.as_str());
        if !self.ctx.policy.is_tracked(&key, &entry.entity_type) {
            return Ok(());
        }

        let kind = entry
            .property_kind(name)
            .cloned()
            .unwrap_or(ValueKind::Text);

        match self.event_type {
            EventType::Added => {
                let current = self.values.current_value(name);
                self.record_wholesale(name, &kind, None, current);
            }
            EventType::Deleted => {
                let original = self.values.original_value(name)?;
                self.record_wholesale(name, &kind, original, None);
            }
            EventType::Modified | EventType::SoftDeleted | EventType::UnDeleted => {
                self.record_change(name, &kind)?;
            }
        }
        Ok(())
    }

    fn record_change(&mut self, name: &str, kind: &ValueKind) -> Result<(), TrackerError> {
        let entry = self.values.entry();
        if entry.state != EntityState::Modified || !entry.is_modified(name) {
            return Ok(());
        }
        // No stored original to flatten against.
        if kind.is_complex() && self.ctx.config.disconnected_context {
            return Ok(());
        }

        let original = self.values.original_value(name)?;
        let current = self.values.current_value(name);
        let comparator = self.ctx.comparators.comparator_for(kind);
        if comparator.are_equal(self.ctx.comparators, current.as_ref(), original.as_ref()) {
            return Ok(());
        }

        if !kind.is_complex() {
            self.push(name, original.as_ref(), current.as_ref());
            return Ok(());
        }

        // Flatten: one detail per differing sub-field, compared with the
        // complex type's comparator.
        let cur = current.as_ref().and_then(Value::as_complex);
        let orig = original.as_ref().and_then(Value::as_complex);
        let names: Vec<String> = match (cur, orig) {
            (Some(c), o) => field_names(c, o).into_iter().map(str::to_string).collect(),
            (None, Some(o)) => o.field_names().map(str::to_string).collect(),
            (None, None) => Vec::new(),
        };
        for field in names {
            let new_value = cur.and_then(|c| c.get(&field));
            let old_value = orig.and_then(|o| o.get(&field));
            if !comparator.are_equal(self.ctx.comparators, new_value, old_value) {
                self.pending.push_back(AuditLogDetail {
                    property_name: format!("{}_{}", name, field),
                    original_value: to_text(old_value),
                    new_value: to_text(new_value),
                });
            }
        }
        Ok(())
    }

    /// Additions and deletions: record every value on one side.
    fn record_wholesale(
        &mut self,
        name: &str,
        kind: &ValueKind,
        original: Option<Value>,
        current: Option<Value>,
    ) {
        let side = current.as_ref().or(original.as_ref());
        let complex = if kind.is_complex() {
            side.and_then(Value::as_complex)
        } else {
            None
        };

        match complex {
            Some(c) => {
                let is_addition = current.is_some();
                for (field, value) in &c.fields {
                    let qualified = format!("{}_{}", name, field);
                    if is_addition {
                        self.push_unless_empty(&qualified, None, value.as_ref());
                    } else {
                        self.push_unless_empty(&qualified, value.as_ref(), None);
                    }
                }
            }
            None => self.push_unless_empty(name, original.as_ref(), current.as_ref()),
        }
    }

    fn push_unless_empty(&mut self, name: &str, original: Option<&Value>, current: Option<&Value>) {
        let recorded = current.or(original);
        if !self.ctx.config.track_empty_properties_on_add_and_delete && is_empty(recorded) {
            return;
        }
        self.push(name, original, current);
    }

    fn push(&mut self, name: &str, original: Option<&Value>, current: Option<&Value>) {
        self.pending.push_back(AuditLogDetail {
            property_name: name.to_string(),
            original_value: to_text(original),
            new_value: to_text(current),
        });
    }
}

impl Iterator for DetailGenerator<'_> {
    type Item = Result<AuditLogDetail, TrackerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(detail) = self.pending.pop_front() {
                return Some(Ok(detail));
            }
            let name = self.names.next()?;
            if let Err(e) = self.visit(&name) {
                self.failed = true;
                return Some(Err(e));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SessionError;
    use crate::session::{EntityEntry, EntryHandle, PersistenceSession, PropertyValues};
    use crate::value::ComplexValue;
    use tracker_audit::AuditLog;
    use tracker_policy::{AnnotationCatalog, EntityAnnotations};

    const PERSON: &str = "demo::Person";

    struct NoStorage {
        fail_reads: bool,
    }

    impl PersistenceSession for NoStorage {
        fn changed_entries(&self) -> Vec<EntityEntry> {
            Vec::new()
        }

        fn entry(&self, _handle: EntryHandle) -> Option<EntityEntry> {
            None
        }

        fn database_values(
            &self,
            entry: &EntityEntry,
        ) -> Result<Option<PropertyValues>, SessionError> {
            if self.fail_reads {
                return Err(SessionError::ReadFailed {
                    entity_type: entry.entity_type.clone(),
                    reason: "offline".to_string(),
                });
            }
            Ok(None)
        }

        fn add_audit_logs(&mut self, _logs: Vec<AuditLog>) {}

        fn discard_audit_logs(&mut self) -> Vec<AuditLog> {
            Vec::new()
        }

        fn save_changes(&mut self) -> Result<usize, SessionError> {
            Ok(0)
        }
    }

    fn address(city: &str, zip: &str) -> Value {
        Value::from(ComplexValue::new("Address").field("City", city).field("Zip", zip))
    }

    fn values(name: &str, age: i64, addr: Value) -> PropertyValues {
        PropertyValues::new()
            .with("Id", ValueKind::Int, Some(Value::from(1)))
            .with("Name", ValueKind::Text, Some(Value::from(name)))
            .with("Age", ValueKind::Int, Some(Value::from(age)))
            .with("Nickname", ValueKind::Text, None)
            .with("Address", ValueKind::Complex("Address".to_string()), Some(addr))
    }

    fn modified(
        original: PropertyValues,
        current: PropertyValues,
        modified: &[&str],
    ) -> EntityEntry {
        EntityEntry {
            handle: EntryHandle(1),
            entity_type: PERSON.to_string(),
            state: EntityState::Modified,
            key_properties: vec!["Id".to_string()],
            original_values: original,
            current_values: current,
            modified_properties: modified.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn policy() -> TrackingPolicy {
        TrackingPolicy::new(AnnotationCatalog::new().with(PERSON, EntityAnnotations::tracked()))
    }

    fn run(
        entry: &EntityEntry,
        event_type: EventType,
        policy: &TrackingPolicy,
    ) -> Result<Vec<AuditLogDetail>, TrackerError> {
        let session = NoStorage { fail_reads: false };
        let comparators = ComparatorRegistry::new();
        let ctx = DetailContext {
            policy,
            comparators: &comparators,
            config: policy.config(),
        };
        let values = EntryValues::new(entry, &session, policy.config().disconnected_context);
        DetailGenerator::new(values, event_type, ctx).collect()
    }

    #[test]
    fn changed_scalar_yields_one_detail() {
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Anna", 30, address("A", "1")),
            &["Name", "Age", "Address"],
        );
        let details = run(&entry, EventType::Modified, &policy()).unwrap();
        assert_eq!(details, vec![AuditLogDetail::new("Name", Some("Ann"), Some("Anna"))]);
    }

    #[test]
    fn unmodified_flag_suppresses_detail_even_if_values_differ() {
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Anna", 30, address("A", "1")),
            &[],
        );
        assert!(run(&entry, EventType::Modified, &policy()).unwrap().is_empty());
    }

    #[test]
    fn nested_property_is_flattened_per_changed_field() {
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Ann", 30, address("B", "1")),
            &["Address"],
        );
        let details = run(&entry, EventType::Modified, &policy()).unwrap();
        assert_eq!(details, vec![AuditLogDetail::new("Address_City", Some("A"), Some("B"))]);
    }

    #[test]
    fn equal_nested_values_yield_nothing() {
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Ann", 30, address("A", "1")),
            &["Address"],
        );
        assert!(run(&entry, EventType::Modified, &policy()).unwrap().is_empty());
    }

    #[test]
    fn untracked_property_is_skipped() {
        let policy = policy();
        policy.override_property(PropertyTrackingKey::new("Name", PERSON), false);
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Anna", 31, address("A", "1")),
            &["Name", "Age"],
        );
        let details = run(&entry, EventType::Modified, &policy).unwrap();
        assert_eq!(details, vec![AuditLogDetail::new("Age", Some("30"), Some("31"))]);
    }

    #[test]
    fn soft_delete_uses_the_same_change_detection() {
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Anna", 30, address("A", "1")),
            &["Name"],
        );
        let modified = run(&entry, EventType::Modified, &policy()).unwrap();
        let soft = run(&entry, EventType::SoftDeleted, &policy()).unwrap();
        let undeleted = run(&entry, EventType::UnDeleted, &policy()).unwrap();
        assert_eq!(modified, soft);
        assert_eq!(modified, undeleted);
    }

    #[test]
    fn change_detection_ignores_non_modified_entries() {
        let mut entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Anna", 30, address("A", "1")),
            &["Name"],
        );
        entry.state = EntityState::Deleted;
        assert!(run(&entry, EventType::Modified, &policy()).unwrap().is_empty());
    }

    #[test]
    fn addition_records_every_tracked_non_empty_value() {
        let mut entry = modified(PropertyValues::new(), values("Ann", 30, address("A", "1")), &[]);
        entry.state = EntityState::Added;
        let details = run(&entry, EventType::Added, &policy()).unwrap();
        let names: Vec<_> = details.iter().map(|d| d.property_name.as_str()).collect();
        assert_eq!(names, vec!["Id", "Name", "Age", "Address_City", "Address_Zip"]);
        assert!(details.iter().all(|d| d.original_value.is_none()));
        assert_eq!(details[1].new_value.as_deref(), Some("Ann"));
    }

    #[test]
    fn addition_keeps_empty_values_when_configured() {
        let policy = policy();
        policy.set_track_empty_properties_on_add_and_delete(true);
        let mut entry = modified(PropertyValues::new(), values("Ann", 30, address("A", "1")), &[]);
        entry.state = EntityState::Added;
        let details = run(&entry, EventType::Added, &policy).unwrap();
        let nickname = details.iter().find(|d| d.property_name == "Nickname").unwrap();
        assert_eq!(nickname.new_value, None);
    }

    #[test]
    fn deletion_records_original_values() {
        let original = values("Ann", 30, address("A", "1"));
        let mut entry = modified(original.clone(), original, &[]);
        entry.state = EntityState::Deleted;
        let details = run(&entry, EventType::Deleted, &policy()).unwrap();
        assert_eq!(details[1], AuditLogDetail::new("Name", Some("Ann"), None::<String>));
        assert!(details.iter().all(|d| d.new_value.is_none()));
    }

    #[test]
    fn disconnected_mode_skips_complex_properties() {
        let policy = policy();
        policy.set_disconnected_context(true);
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Ann", 30, address("B", "1")),
            &["Address"],
        );
        assert!(run(&entry, EventType::Modified, &policy).unwrap().is_empty());
    }

    #[test]
    fn storage_errors_stop_the_sequence() {
        let policy = policy();
        policy.set_disconnected_context(true);
        let entry = modified(
            values("Ann", 30, address("A", "1")),
            values("Anna", 30, address("A", "1")),
            &["Name", "Age"],
        );
        let session = NoStorage { fail_reads: true };
        let comparators = ComparatorRegistry::new();
        let ctx = DetailContext {
            policy: &policy,
            comparators: &comparators,
            config: policy.config(),
        };
        let values = EntryValues::new(&entry, &session, true);
        let mut generator = DetailGenerator::new(values, EventType::Modified, ctx);
        assert!(matches!(generator.next(), Some(Err(TrackerError::Session(_)))));
        assert!(generator.next().is_none());
    }
}
