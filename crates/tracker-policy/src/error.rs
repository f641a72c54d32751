// error.rs — Error types for the policy subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading tracking configuration.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The settings file could not be read.
    #[error("failed to read settings at {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for `TrackerSettings`.
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] toml::de::Error),
}
