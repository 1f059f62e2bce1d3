//! Error types for catsync-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::SyncDirection;

/// All errors that can arise while loading or validating configuration.
///
/// Every variant is fatal at startup: the process boundary reports it and
/// exits instead of recovering.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure reading the config file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file did not exist at the given path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A field holds a value the engine cannot run with.
    #[error("invalid config: {0}")]
    Invalid(String),

    /// Only cluster-to-catalog synchronization is implemented.
    #[error("sync direction '{0}' is not supported; use 'to-catalog'")]
    UnsupportedDirection(SyncDirection),
}

/// A cluster resource that cannot be mapped to a catalog registration.
///
/// Never retried: the mapper treats the resource as "nothing to sync".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedResource {
    #[error("invalid service key '{value}': {reason}")]
    InvalidKey { value: String, reason: &'static str },

    #[error("annotation {annotation} has invalid value '{value}'")]
    InvalidAnnotation { annotation: String, value: String },

    #[error("failed to parse manifest: {0}")]
    Manifest(String),
}
