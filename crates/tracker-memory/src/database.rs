// database.rs — Shared in-memory storage.
//
// MemoryDatabase is the "server" side: tables of committed rows keyed by
// record id, a per-type identity counter, and the audit-log table. Sessions
// stage changes locally and apply them here in one locked step, so a commit
// is all-or-nothing.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracker_audit::{AuditLog, AuditLogFilter};
use tracker_core::Value;

use crate::error::MemoryError;
use crate::record::EntityRecord;
use crate::session::MemorySession;

/// Last identity handed out per entity type. Commits work on a copy and
/// store it back only once every write has been validated.
#[derive(Debug, Clone, Default)]
pub(crate) struct Identities(HashMap<String, i64>);

impl Identities {
    fn next(&mut self, entity_type: &str) -> i64 {
        let counter = self.0.entry(entity_type.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Keep generated identities ahead of explicitly supplied ones.
    fn observe(&mut self, entity_type: &str, value: i64) {
        let counter = self.0.entry(entity_type.to_string()).or_insert(0);
        *counter = (*counter).max(value);
    }

    /// Fill a null identity key, or record an explicit one.
    pub(crate) fn assign(&mut self, record: &mut EntityRecord) {
        let Some(name) = record.identity.clone() else {
            return;
        };
        if record.needs_identity() {
            let id = self.next(&record.entity_type);
            record.values.set(&name, Some(Value::Int(id)));
        } else if let Some(Value::Int(explicit)) = record.values.get(&name) {
            self.observe(&record.entity_type, *explicit);
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Store {
    /// entity type → record id → row
    pub(crate) tables: HashMap<String, BTreeMap<String, EntityRecord>>,
    pub(crate) identities: Identities,
    pub(crate) audit_logs: Vec<AuditLog>,
    pub(crate) commits: usize,
}

impl Store {
    pub(crate) fn row(&self, entity_type: &str, record_id: &str) -> Option<&EntityRecord> {
        self.tables.get(entity_type).and_then(|t| t.get(record_id))
    }
}

/// Cheaply cloneable handle to one in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<Mutex<Store>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new unit of work against this database.
    pub fn session(&self) -> MemorySession {
        MemorySession::new(self.clone())
    }

    /// Insert a row directly, bypassing sessions and auditing (seed data).
    /// Identity values are generated as on a normal insert.
    pub fn seed(&self, mut record: EntityRecord) -> Result<String, MemoryError> {
        let mut store = self.lock();
        store.identities.assign(&mut record);
        let record_id = record.record_id()?;
        store
            .tables
            .entry(record.entity_type.clone())
            .or_default()
            .insert(record_id.clone(), record);
        Ok(record_id)
    }

    /// The committed row with this record id.
    pub fn get(&self, entity_type: &str, record_id: &str) -> Option<EntityRecord> {
        self.lock().row(entity_type, record_id).cloned()
    }

    /// All committed rows of a type, ordered by record id.
    pub fn rows(&self, entity_type: &str) -> Vec<EntityRecord> {
        self.lock()
            .tables
            .get(entity_type)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Committed audit headers matching `filter`, oldest first.
    pub fn audit_logs(&self, filter: &AuditLogFilter) -> Vec<AuditLog> {
        self.lock()
            .audit_logs
            .iter()
            .filter(|log| filter.matches(log))
            .cloned()
            .collect()
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Store> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_audit::EventType;
    use tracker_core::ValueKind;

    fn tag(id: Option<i64>, name: &str) -> EntityRecord {
        EntityRecord::new("blog::Tag")
            .identity_key("Id", id)
            .property("Name", ValueKind::Text, Some(Value::from(name)))
    }

    #[test]
    fn seeding_generates_identities_per_type() {
        let db = MemoryDatabase::new();
        assert_eq!(db.seed(tag(None, "a")).unwrap(), "1");
        assert_eq!(db.seed(tag(None, "b")).unwrap(), "2");
        assert_eq!(db.seed(tag(Some(40), "c")).unwrap(), "40");
        assert_eq!(db.seed(tag(None, "d")).unwrap(), "41");
        assert_eq!(db.rows("blog::Tag").len(), 4);
        let second = db.get("blog::Tag", "2").unwrap();
        assert_eq!(second.get("Name"), Some(&Value::from("b")));
        assert!(db.get("blog::Post", "1").is_none());
    }

    #[test]
    fn audit_log_queries_filter_by_entity_and_record() {
        let db = MemoryDatabase::new();
        {
            let mut store = db.lock();
            store.audit_logs.push(AuditLog::new("blog::Tag", EventType::Added, "1"));
            store.audit_logs.push(AuditLog::new("blog::Tag", EventType::Modified, "2"));
            store.audit_logs.push(AuditLog::new("blog::Post", EventType::Added, "1"));
        }
        assert_eq!(db.audit_logs(&AuditLogFilter::all()).len(), 3);
        assert_eq!(db.audit_logs(&AuditLogFilter::for_entity("blog::Tag")).len(), 2);
        let one = db.audit_logs(&AuditLogFilter::for_record("blog::Tag", "2"));
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].event_type, EventType::Modified);
    }
}
