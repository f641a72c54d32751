//! # tracker-policy
//!
//! Decides which entities and properties get audited.
//!
//! The decision is layered. A [`TrackingPolicy`] merges, in order of
//! precedence:
//!
//! 1. per-property overrides keyed by [`PropertyTrackingKey`],
//! 2. per-entity-type overrides,
//! 3. annotation defaults ([`EntityAnnotations`]) read once per entity type
//!    from an [`AnnotationSource`] and cached,
//!
//! all gated by the global switches in [`TrackingConfig`].
//!
//! ## Key invariants
//!
//! - **Global off means off**: when `enabled` is false nothing is tracked,
//!   whatever the overrides say.
//! - **Unknown types are untracked**: an entity type with no annotations is
//!   only tracked through explicit overrides.
//! - **Last write wins**: conflicting overrides are not an error.

pub mod annotations;
pub mod error;
pub mod key;
pub mod policy;
pub mod settings;

pub use annotations::{AnnotationCatalog, AnnotationSource, EntityAnnotations, Trackable};
pub use error::PolicyError;
pub use key::PropertyTrackingKey;
pub use policy::{TrackingConfig, TrackingPolicy};
pub use settings::{IdentitySettings, TrackerSettings};
