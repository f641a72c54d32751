// session.rs — MemorySession: a unit of work over a MemoryDatabase.
//
// Entities are attached in one of four ways:
//   - add: a new row, inserted on commit (identity keys generated then),
//   - load: a stored row, tracked with a live snapshot of its values,
//   - update: a detached row attached as modified, every property flagged,
//     with no snapshot of what is stored (the original equals the current),
//   - remove: an attached row marked for deletion.
//
// A commit applies every pending change plus the queued audit logs to the
// database in one locked step, then accepts the changes: inserted and
// modified entries become unchanged with a fresh snapshot, deleted entries
// are detached. A failed commit changes nothing: rows, identity counters and
// the queued audit logs all stay as they were.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracker_audit::{record_id_from_keys, AuditLog};
use tracker_core::{
    AsyncPersistenceSession, EntityEntry, EntityState, EntryHandle, PersistenceSession,
    PropertyValues, SessionError, Value,
};

use crate::database::MemoryDatabase;
use crate::error::MemoryError;
use crate::record::EntityRecord;

/// One attached entity.
#[derive(Debug, Clone)]
struct Tracked {
    handle: EntryHandle,
    state: EntityState,
    record: EntityRecord,
    original: PropertyValues,
    modified: BTreeSet<String>,
}

impl Tracked {
    fn snapshot(&self) -> EntityEntry {
        EntityEntry {
            handle: self.handle,
            entity_type: self.record.entity_type.clone(),
            state: self.state,
            key_properties: self.record.key_properties.clone(),
            original_values: self.original.clone(),
            current_values: self.record.values.clone(),
            modified_properties: self.modified.clone(),
        }
    }

    fn accept(&mut self) {
        self.original = self.record.values.clone();
        self.modified.clear();
        self.state = EntityState::Unchanged;
    }
}

/// A planned row write, validated before anything is applied.
enum Write {
    Insert { index: usize, record_id: String, record: EntityRecord },
    Update { record_id: String, record: EntityRecord },
    Delete { entity_type: String, record_id: String },
}

pub struct MemorySession {
    db: MemoryDatabase,
    entries: Vec<Tracked>,
    queued: Vec<AuditLog>,
    next_handle: u64,
    fail_next_commit: Option<String>,
}

impl MemorySession {
    pub fn new(db: MemoryDatabase) -> Self {
        Self {
            db,
            entries: Vec::new(),
            queued: Vec::new(),
            next_handle: 1,
            fail_next_commit: None,
        }
    }

    pub fn database(&self) -> &MemoryDatabase {
        &self.db
    }

    fn attach(
        &mut self,
        state: EntityState,
        record: EntityRecord,
        modified: BTreeSet<String>,
    ) -> EntryHandle {
        let handle = EntryHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Tracked {
            handle,
            state,
            original: record.values.clone(),
            record,
            modified,
        });
        handle
    }

    fn tracked_mut(&mut self, handle: EntryHandle) -> Result<&mut Tracked, MemoryError> {
        self.entries
            .iter_mut()
            .find(|t| t.handle == handle)
            .ok_or(MemoryError::UnknownEntry(handle))
    }

    /// Attach a new entity to be inserted.
    pub fn add(&mut self, record: EntityRecord) -> EntryHandle {
        self.attach(EntityState::Added, record, BTreeSet::new())
    }

    /// Attach a stored row. Loading a row that is already attached returns
    /// the existing handle.
    pub fn load(&mut self, entity_type: &str, record_id: &str) -> Result<EntryHandle, MemoryError> {
        for tracked in &self.entries {
            if tracked.record.entity_type == entity_type
                && tracked.state != EntityState::Added
                && tracked.record.record_id().ok().as_deref() == Some(record_id)
            {
                return Ok(tracked.handle);
            }
        }

        let record = self
            .db
            .get(entity_type, record_id)
            .ok_or_else(|| MemoryError::NotFound {
                entity_type: entity_type.to_string(),
                record_id: record_id.to_string(),
            })?;
        Ok(self.attach(EntityState::Unchanged, record, BTreeSet::new()))
    }

    /// Attach a detached entity as modified without loading it first.
    /// Every property is flagged modified.
    pub fn update(&mut self, record: EntityRecord) -> EntryHandle {
        let modified = record.values.names().map(str::to_string).collect();
        self.attach(EntityState::Modified, record, modified)
    }

    /// Change one property. On a loaded entity the property is flagged
    /// modified while its value differs from the snapshot.
    pub fn set(
        &mut self,
        handle: EntryHandle,
        property: &str,
        value: Option<Value>,
    ) -> Result<(), MemoryError> {
        let tracked = self.tracked_mut(handle)?;
        if !tracked.record.values.set(property, value) {
            return Err(MemoryError::UnknownProperty {
                entity_type: tracked.record.entity_type.clone(),
                property: property.to_string(),
            });
        }

        if matches!(tracked.state, EntityState::Unchanged | EntityState::Modified) {
            if tracked.record.values.get(property) != tracked.original.get(property) {
                tracked.modified.insert(property.to_string());
            } else {
                tracked.modified.remove(property);
            }
            tracked.state = if tracked.modified.is_empty() {
                EntityState::Unchanged
            } else {
                EntityState::Modified
            };
        }
        Ok(())
    }

    /// Mark an entity for deletion. A pending insert is simply detached.
    pub fn remove(&mut self, handle: EntryHandle) -> Result<(), MemoryError> {
        let tracked = self.tracked_mut(handle)?;
        if tracked.state == EntityState::Added {
            self.entries.retain(|t| t.handle != handle);
        } else {
            tracked.state = EntityState::Deleted;
        }
        Ok(())
    }

    /// Current values of an attached entity.
    pub fn record(&self, handle: EntryHandle) -> Option<&EntityRecord> {
        self.entries
            .iter()
            .find(|t| t.handle == handle)
            .map(|t| &t.record)
    }

    pub fn state(&self, handle: EntryHandle) -> Option<EntityState> {
        self.entries.iter().find(|t| t.handle == handle).map(|t| t.state)
    }

    /// Audit logs waiting for the next commit.
    pub fn queued_audit_logs(&self) -> &[AuditLog] {
        &self.queued
    }

    /// Make the next commit fail with `reason` without writing anything.
    pub fn fail_next_commit(&mut self, reason: impl Into<String>) {
        self.fail_next_commit = Some(reason.into());
    }

    /// Apply all pending changes and queued audit logs. Returns the number
    /// of rows written, audit logs included.
    pub fn commit(&mut self) -> Result<usize, MemoryError> {
        if let Some(reason) = self.fail_next_commit.take() {
            return Err(MemoryError::InjectedFailure(reason));
        }

        let mut store = self.db.lock();
        let mut identities = store.identities.clone();
        let mut writes = Vec::new();
        let mut inserted = HashSet::new();

        for (index, tracked) in self.entries.iter().enumerate() {
            let entity_type = &tracked.record.entity_type;
            match tracked.state {
                EntityState::Unchanged => {}
                EntityState::Added => {
                    let mut record = tracked.record.clone();
                    identities.assign(&mut record);
                    let record_id = record.record_id()?;
                    if store.row(entity_type, &record_id).is_some()
                        || !inserted.insert((entity_type.clone(), record_id.clone()))
                    {
                        return Err(MemoryError::DuplicateKey {
                            entity_type: entity_type.clone(),
                            record_id,
                        });
                    }
                    writes.push(Write::Insert { index, record_id, record });
                }
                EntityState::Modified | EntityState::Deleted => {
                    let record_id = tracked.record.record_id()?;
                    if store.row(entity_type, &record_id).is_none() {
                        return Err(MemoryError::NotFound {
                            entity_type: entity_type.clone(),
                            record_id,
                        });
                    }
                    writes.push(if tracked.state == EntityState::Deleted {
                        Write::Delete {
                            entity_type: entity_type.clone(),
                            record_id,
                        }
                    } else {
                        Write::Update {
                            record_id,
                            record: tracked.record.clone(),
                        }
                    });
                }
            }
        }

        store.identities = identities;
        let rows = writes.len() + self.queued.len();
        let mut generated = Vec::new();
        for write in writes {
            match write {
                Write::Insert { index, record_id, record } => {
                    generated.push((index, record.clone()));
                    store
                        .tables
                        .entry(record.entity_type.clone())
                        .or_default()
                        .insert(record_id, record);
                }
                Write::Update { record_id, record } => {
                    store
                        .tables
                        .entry(record.entity_type.clone())
                        .or_default()
                        .insert(record_id, record);
                }
                Write::Delete { entity_type, record_id } => {
                    if let Some(table) = store.tables.get_mut(&entity_type) {
                        table.remove(&record_id);
                    }
                }
            }
        }
        store.audit_logs.append(&mut self.queued);
        store.commits += 1;
        drop(store);

        for (index, record) in generated {
            self.entries[index].record = record;
        }
        self.entries.retain(|t| t.state != EntityState::Deleted);
        for tracked in &mut self.entries {
            tracked.accept();
        }

        tracing::debug!(rows, "memory commit applied");
        Ok(rows)
    }
}

impl PersistenceSession for MemorySession {
    fn changed_entries(&self) -> Vec<EntityEntry> {
        self.entries
            .iter()
            .filter(|t| t.state != EntityState::Unchanged)
            .map(Tracked::snapshot)
            .collect()
    }

    fn entry(&self, handle: EntryHandle) -> Option<EntityEntry> {
        self.entries
            .iter()
            .find(|t| t.handle == handle)
            .map(Tracked::snapshot)
    }

    fn database_values(
        &self,
        entry: &EntityEntry,
    ) -> Result<Option<PropertyValues>, SessionError> {
        let Ok(record_id) = record_id_from_keys(&entry.entity_type, &entry.key_values()) else {
            return Ok(None);
        };
        Ok(self
            .db
            .get(&entry.entity_type, &record_id)
            .map(|record| record.values))
    }

    fn add_audit_logs(&mut self, logs: Vec<AuditLog>) {
        self.queued.extend(logs);
    }

    fn discard_audit_logs(&mut self) -> Vec<AuditLog> {
        std::mem::take(&mut self.queued)
    }

    fn save_changes(&mut self) -> Result<usize, SessionError> {
        self.commit().map_err(|e| {
            tracing::debug!(error = %e, "memory commit failed");
            SessionError::CommitFailed(e.to_string())
        })
    }
}

#[async_trait]
impl AsyncPersistenceSession for MemorySession {
    async fn save_changes_async(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<usize, SessionError> {
        tokio::task::yield_now().await;
        if cancel.is_cancelled() {
            return Err(SessionError::Cancelled);
        }
        self.save_changes()
    }
}
