// accessor.rs — Original and current values of one entry.
//
// Connected sessions keep a live snapshot of every entity as it was loaded,
// so the original value is read straight from the entry. Disconnected
// sessions (an entity attached as "modified" without ever being loaded)
// have no such snapshot; the original is read from storage instead, once
// per entry.
//
// Complex properties are not diffed in disconnected mode: their original is
// reported as None.

use std::cell::RefCell;

use crate::error::TrackerError;
use crate::session::{EntityEntry, PersistenceSession, PropertyValues};
use crate::value::Value;

/// Value access for one entry during one commit cycle.
pub struct EntryValues<'a> {
    entry: &'a EntityEntry,
    session: &'a dyn PersistenceSession,
    disconnected: bool,
    /// Stored snapshot, fetched on first use in disconnected mode.
    stored: RefCell<Option<Option<PropertyValues>>>,
}

impl<'a> EntryValues<'a> {
    pub fn new(
        entry: &'a EntityEntry,
        session: &'a dyn PersistenceSession,
        disconnected: bool,
    ) -> Self {
        Self {
            entry,
            session,
            disconnected,
            stored: RefCell::new(None),
        }
    }

    pub fn entry(&self) -> &'a EntityEntry {
        self.entry
    }

    /// The value before this commit's changes.
    pub fn original_value(&self, property_name: &str) -> Result<Option<Value>, TrackerError> {
        if !self.disconnected {
            return Ok(self.entry.original_values.get(property_name).cloned());
        }

        if self.entry.is_complex(property_name) {
            return Ok(None);
        }

        if self.stored.borrow().is_none() {
            let fetched = self.session.database_values(self.entry)?;
            if fetched.is_none() {
                tracing::debug!(
                    entity_type = %self.entry.entity_type,
                    handle = %self.entry.handle,
                    "no stored row for disconnected entry"
                );
            }
            *self.stored.borrow_mut() = Some(fetched);
        }

        Ok(self
            .stored
            .borrow()
            .as_ref()
            .and_then(|stored| stored.as_ref())
            .and_then(|values| values.get(property_name).cloned()))
    }

    /// The value about to be written.
    pub fn current_value(&self, property_name: &str) -> Option<Value> {
        self.entry.current_values.get(property_name).cloned()
    }
}
