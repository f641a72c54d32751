// settings.rs — Tracker settings loaded from a TOML file.
//
// A typical `tracker.toml`:
//
//   events_log = "audit-events.jsonl"
//
//   [tracking]
//   enabled = true
//   track_empty_properties_on_add_and_delete = false
//   disconnected_context = false
//
//   [identity]
//   default_username = "system"
//
// Every key is optional; a missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::policy::{TrackingConfig, TrackingPolicy};

/// Top-level tracker settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerSettings {
    /// Global tracking switches.
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// How the acting user is resolved when the caller passes none.
    #[serde(default)]
    pub identity: IdentitySettings,

    /// Optional JSONL file that receives every audit-generated event.
    #[serde(default)]
    pub events_log: Option<PathBuf>,
}

/// Acting-user settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySettings {
    /// Username recorded when neither the caller nor a username factory
    /// supplies one.
    #[serde(default)]
    pub default_username: Option<String>,
}

impl TrackerSettings {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PolicyError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Try to load settings, returning defaults if the file is missing or
    /// unreadable.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path.as_ref()) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!("using default tracker settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, PolicyError> {
        Ok(toml::from_str(content)?)
    }

    /// Push the tracking switches into a live policy.
    pub fn apply_to(&self, policy: &TrackingPolicy) {
        policy.set_config(self.tracking);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_document_yields_defaults() {
        let settings = TrackerSettings::from_toml_str("").unwrap();
        assert_eq!(settings, TrackerSettings::default());
        assert!(settings.tracking.enabled);
    }

    #[test]
    fn full_document_parses() {
        let settings = TrackerSettings::from_toml_str(
            r#"
            events_log = "events.jsonl"

            [tracking]
            enabled = false
            track_empty_properties_on_add_and_delete = true
            disconnected_context = true

            [identity]
            default_username = "system"
            "#,
        )
        .unwrap();

        assert!(!settings.tracking.enabled);
        assert!(settings.tracking.track_empty_properties_on_add_and_delete);
        assert!(settings.tracking.disconnected_context);
        assert_eq!(settings.identity.default_username.as_deref(), Some("system"));
        assert_eq!(settings.events_log, Some(PathBuf::from("events.jsonl")));
    }

    #[test]
    fn partial_tracking_table_keeps_enabled_default() {
        let settings =
            TrackerSettings::from_toml_str("[tracking]\ndisconnected_context = true\n").unwrap();
        assert!(settings.tracking.enabled);
        assert!(settings.tracking.disconnected_context);
    }

    #[test]
    fn invalid_toml_is_reported() {
        let err = TrackerSettings::from_toml_str("[tracking\nenabled = ").unwrap_err();
        assert!(matches!(err, PolicyError::InvalidSettings(_)));
    }

    #[test]
    fn load_reads_file_and_missing_file_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tracker.toml");
        std::fs::write(&path, "[identity]\ndefault_username = \"ops\"\n").unwrap();

        let settings = TrackerSettings::load(&path).unwrap();
        assert_eq!(settings.identity.default_username.as_deref(), Some("ops"));

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            TrackerSettings::load(&missing),
            Err(PolicyError::ReadFailed { .. })
        ));
        assert_eq!(
            TrackerSettings::load_or_default(&missing),
            TrackerSettings::default()
        );
    }

    #[test]
    fn apply_to_pushes_switches() {
        let policy = TrackingPolicy::default();
        let settings =
            TrackerSettings::from_toml_str("[tracking]\nenabled = false\n").unwrap();
        settings.apply_to(&policy);
        assert!(!policy.is_enabled());
    }
}
