// policy.rs — Layered tracking policy.
//
// Every property of every changed entity passes through `is_tracked()`:
//
// 0. Is tracking globally disabled? → untracked
// 1. Is there a property-level override for (property, entity type)? → use it
// 2. Is there an entity-level override for the entity type? → use it
// 3. Otherwise → annotation default (type tracked AND property not skipped)
//
// Overrides are normally written once at start-up and read on every save.
// Each layer sits behind its own RwLock so concurrent save cycles only ever
// take shared read locks.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::annotations::{AnnotationCatalog, AnnotationSource, EntityAnnotations};
use crate::key::PropertyTrackingKey;

/// Process-wide tracking switches. Only changed by explicit calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Master switch. When false, saves are plain commits with no auditing.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Emit details (and detail-less headers) for null/empty values when an
    /// entity is added or deleted.
    #[serde(default)]
    pub track_empty_properties_on_add_and_delete: bool,

    /// Sessions keep no pre-change snapshot; original values must be
    /// re-read from storage.
    #[serde(default)]
    pub disconnected_context: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            track_empty_properties_on_add_and_delete: false,
            disconnected_context: false,
        }
    }
}

/// The resolved tracking policy shared by every save cycle.
///
/// Wrap it in an `Arc` and hand it to each tracker; there is no global
/// instance.
pub struct TrackingPolicy {
    config: RwLock<TrackingConfig>,
    source: Box<dyn AnnotationSource>,
    /// Annotation lookups, cached on first use per entity type.
    declared: RwLock<HashMap<String, Option<Arc<EntityAnnotations>>>>,
    entity_overrides: RwLock<HashMap<String, bool>>,
    property_overrides: RwLock<HashMap<PropertyTrackingKey, bool>>,
}

impl TrackingPolicy {
    /// Create a policy over an annotation source with default switches.
    pub fn new(source: impl AnnotationSource + 'static) -> Self {
        Self::with_config(source, TrackingConfig::default())
    }

    pub fn with_config(source: impl AnnotationSource + 'static, config: TrackingConfig) -> Self {
        Self {
            config: RwLock::new(config),
            source: Box::new(source),
            declared: RwLock::new(HashMap::new()),
            entity_overrides: RwLock::new(HashMap::new()),
            property_overrides: RwLock::new(HashMap::new()),
        }
    }

    // ── switches ──────────────────────────────────────────────

    pub fn config(&self) -> TrackingConfig {
        *read(&self.config)
    }

    pub fn set_config(&self, config: TrackingConfig) {
        *write(&self.config) = config;
    }

    pub fn is_enabled(&self) -> bool {
        read(&self.config).enabled
    }

    pub fn set_enabled(&self, enabled: bool) {
        write(&self.config).enabled = enabled;
    }

    pub fn set_track_empty_properties_on_add_and_delete(&self, track: bool) {
        write(&self.config).track_empty_properties_on_add_and_delete = track;
    }

    pub fn set_disconnected_context(&self, disconnected: bool) {
        write(&self.config).disconnected_context = disconnected;
    }

    // ── overrides ─────────────────────────────────────────────

    /// Force an entity type on or off, ahead of its annotations.
    pub fn override_entity(&self, entity_type: impl Into<String>, tracked: bool) {
        let entity_type = entity_type.into();
        tracing::debug!(%entity_type, tracked, "entity tracking override");
        write(&self.entity_overrides).insert(entity_type, tracked);
    }

    /// Force one property on or off, ahead of every entity-level setting.
    /// A later call for the same key replaces the earlier one.
    pub fn override_property(&self, key: PropertyTrackingKey, tracked: bool) {
        tracing::debug!(%key, tracked, "property tracking override");
        write(&self.property_overrides).insert(key, tracked);
    }

    /// Track every property of an entity type, including ones the
    /// annotations skip and ones previously disabled by override.
    pub fn track_all_properties(&self, entity_type: impl Into<String>) {
        let entity_type = entity_type.into();
        write(&self.property_overrides)
            .retain(|key, tracked| *tracked || key.entity_type != entity_type);
        self.override_entity(entity_type, true);
    }

    /// Drop every override and the annotation cache. Switches are kept.
    pub fn clear(&self) {
        write(&self.declared).clear();
        write(&self.entity_overrides).clear();
        write(&self.property_overrides).clear();
    }

    /// `clear()` plus switches back to their defaults.
    pub fn reset(&self) {
        self.clear();
        self.set_config(TrackingConfig::default());
    }

    // ── resolution ────────────────────────────────────────────

    /// Whether a property of an entity type is audited.
    pub fn is_tracked(&self, key: &PropertyTrackingKey, entity_type: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }

        if let Some(tracked) = read(&self.property_overrides).get(key) {
            return *tracked;
        }

        if let Some(tracked) = read(&self.entity_overrides).get(entity_type) {
            return *tracked;
        }

        self.declared(entity_type)
            .is_some_and(|ann| ann.tracks_property(&key.property_name))
    }

    /// Whether any audit header is produced for an entity type at all.
    pub fn is_entity_tracked(&self, entity_type: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }

        if let Some(tracked) = read(&self.entity_overrides).get(entity_type) {
            return *tracked;
        }

        self.declared(entity_type).is_some_and(|ann| ann.tracked)
    }

    /// The soft-delete flag property declared for an entity type.
    pub fn soft_delete_property(&self, entity_type: &str) -> Option<String> {
        self.declared(entity_type)
            .and_then(|ann| ann.soft_delete_property.clone())
    }

    /// Annotations for an entity type, resolved once and cached.
    fn declared(&self, entity_type: &str) -> Option<Arc<EntityAnnotations>> {
        if let Some(cached) = read(&self.declared).get(entity_type) {
            return cached.clone();
        }

        let resolved = self.source.annotations(entity_type).map(Arc::new);
        if resolved.is_none() {
            tracing::debug!(%entity_type, "no tracking annotations, treating as untracked");
        }
        write(&self.declared)
            .entry(entity_type.to_string())
            .or_insert(resolved)
            .clone()
    }
}

impl Default for TrackingPolicy {
    fn default() -> Self {
        Self::new(AnnotationCatalog::new())
    }
}

// The guarded maps hold plain data, so a panic in another thread cannot
// leave them half-updated in a way that matters; keep using them.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
