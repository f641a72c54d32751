// annotations.rs — Declarative tracking defaults per entity type.
//
// Annotations are the "compiled-in" answer to "is this audited?": an entity
// type is either tracked or not, individual properties can opt out, and a
// type may name the boolean property it uses as a soft-delete flag.
// The policy reads them once per entity type and caches the result.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Tracking defaults declared for one entity type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityAnnotations {
    /// Whether the entity type is audited by default.
    pub tracked: bool,

    /// Properties excluded from auditing even when the type is tracked.
    #[serde(default)]
    pub skipped_properties: BTreeSet<String>,

    /// Boolean property that marks the entity as logically deleted.
    #[serde(default)]
    pub soft_delete_property: Option<String>,
}

impl EntityAnnotations {
    /// Annotations for an audited entity type (every property tracked).
    pub fn tracked() -> Self {
        Self {
            tracked: true,
            ..Self::default()
        }
    }

    /// Annotations for an entity type that is not audited by default.
    pub fn untracked() -> Self {
        Self::default()
    }

    /// Exclude a property from the default (builder pattern).
    pub fn skip(mut self, property_name: impl Into<String>) -> Self {
        self.skipped_properties.insert(property_name.into());
        self
    }

    /// Declare the soft-delete flag property.
    pub fn soft_delete(mut self, property_name: impl Into<String>) -> Self {
        self.soft_delete_property = Some(property_name.into());
        self
    }

    /// The declared default for one property of this type.
    pub fn tracks_property(&self, property_name: &str) -> bool {
        self.tracked && !self.skipped_properties.contains(property_name)
    }
}

/// Where annotation defaults come from.
///
/// `Send + Sync` because the policy is shared across concurrent save cycles.
pub trait AnnotationSource: Send + Sync {
    /// Annotations for a fully qualified entity type, or `None` if the type
    /// carries none (it is then untracked unless overridden).
    fn annotations(&self, entity_type: &str) -> Option<EntityAnnotations>;
}

/// An entity type that declares its own annotations.
///
/// ```rust
/// use tracker_policy::{AnnotationCatalog, AnnotationSource, EntityAnnotations, Trackable};
///
/// struct Invoice;
/// impl Trackable for Invoice {
///     const ENTITY_TYPE: &'static str = "billing::Invoice";
///     fn annotations() -> EntityAnnotations {
///         EntityAnnotations::tracked().skip("RowVersion")
///     }
/// }
///
/// let catalog = AnnotationCatalog::new().with_type::<Invoice>();
/// assert!(catalog.annotations("billing::Invoice").unwrap().tracked);
/// ```
pub trait Trackable {
    /// Fully qualified entity type name used in audit headers.
    const ENTITY_TYPE: &'static str;

    fn annotations() -> EntityAnnotations;
}

/// Map-backed annotation source.
#[derive(Debug, Clone, Default)]
pub struct AnnotationCatalog {
    entries: HashMap<String, EntityAnnotations>,
}

impl AnnotationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) annotations for an entity type.
    pub fn register(&mut self, entity_type: impl Into<String>, annotations: EntityAnnotations) {
        self.entries.insert(entity_type.into(), annotations);
    }

    /// Register annotations and return self (builder pattern).
    pub fn with(mut self, entity_type: impl Into<String>, annotations: EntityAnnotations) -> Self {
        self.register(entity_type, annotations);
        self
    }

    /// Register a [`Trackable`] type.
    pub fn with_type<T: Trackable>(self) -> Self {
        self.with(T::ENTITY_TYPE, T::annotations())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AnnotationSource for AnnotationCatalog {
    fn annotations(&self, entity_type: &str) -> Option<EntityAnnotations> {
        self.entries.get(entity_type).cloned()
    }
}
