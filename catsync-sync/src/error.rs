//! Error types for catsync-sync.

use std::path::PathBuf;

use thiserror::Error;

use catsync_catalog::CatalogError;
use catsync_core::{MalformedResource, ServiceKey};

/// Failures reading current resource state from the watch source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The resource exists but cannot be mapped. Never retried.
    #[error("malformed resource {key}: {reason}")]
    Malformed {
        key: String,
        #[source]
        reason: MalformedResource,
    },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("resource backend error: {0}")]
    Backend(String),
}

/// Convenience constructor for [`SourceError::Io`].
pub fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SourceError {
    SourceError::Io {
        path: path.into(),
        source,
    }
}

/// Errors a [`crate::Resource`] returns to the controller for retry.
#[derive(Debug, Error)]
pub enum MapperError {
    #[error("failed to read {key}: {source}")]
    Source {
        key: ServiceKey,
        #[source]
        source: SourceError,
    },

    #[error("failed to list resources: {0}")]
    List(#[source] SourceError),
}

/// Errors surfaced by the syncer.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The startup probe failed; fatal at the process boundary.
    #[error("catalog unavailable at startup: {0}")]
    CatalogUnavailable(#[source] CatalogError),

    /// Listing the catalog failed; the pass is deferred to the next wake.
    #[error("failed to list catalog entries: {0}")]
    ListFailed(#[source] CatalogError),

    #[error("syncer task join failure: {0}")]
    Join(String),
}
