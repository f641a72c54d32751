// identity.rs — Acting user and per-cycle metadata.
//
// Both are resolved once per save cycle and stamped on every header the
// cycle produces.

use std::fmt;
use std::sync::Arc;

use tracker_audit::Metadata;

/// Produces the acting user on demand (e.g. from request context).
pub type UsernameFactory = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Fills caller metadata for one cycle.
pub type MetadataFiller = Arc<dyn Fn(&mut Metadata) + Send + Sync>;

/// How a tracker resolves the username and metadata of a cycle.
#[derive(Clone, Default)]
pub struct IdentityConfig {
    pub username_factory: Option<UsernameFactory>,
    pub default_username: Option<String>,
    pub metadata: Option<MetadataFiller>,
}

impl IdentityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Explicit argument, else factory, else default, else none.
    ///
    /// A factory that returns `None` falls through to the default.
    pub fn resolve_username(&self, explicit: Option<&str>) -> Option<String> {
        if let Some(name) = explicit {
            return Some(name.to_string());
        }
        self.username_factory
            .as_ref()
            .and_then(|factory| factory())
            .or_else(|| self.default_username.clone())
    }

    /// A fresh metadata map, filled by the configured callback if any.
    pub fn build_metadata(&self) -> Metadata {
        let mut metadata = Metadata::new();
        if let Some(fill) = &self.metadata {
            fill(&mut metadata);
        }
        metadata
    }
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("username_factory", &self.username_factory.is_some())
            .field("default_username", &self.default_username)
            .field("metadata", &self.metadata.is_some())
            .finish()
    }
}
