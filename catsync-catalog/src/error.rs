//! Error types for catsync-catalog.

use std::time::Duration;

use thiserror::Error;

/// All errors a catalog call can return.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// Connection refused, reset, DNS failure, socket timeout.
    #[error("catalog transport error: {0}")]
    Transport(String),

    /// The caller-supplied deadline elapsed before the call returned.
    #[error("catalog request timed out after {0:?}")]
    Timeout(Duration),

    /// The catalog answered with a non-success HTTP status.
    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode catalog response: {0}")]
    Decode(String),

    #[error("invalid catalog address '{0}'")]
    InvalidAddress(String),

    #[error("catalog task join error: {0}")]
    Join(String),
}

impl CatalogError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            CatalogError::Transport(_) | CatalogError::Timeout(_) | CatalogError::Join(_) => true,
            CatalogError::Status { status, .. } => *status >= 500 || *status == 429,
            CatalogError::Decode(_) | CatalogError::InvalidAddress(_) => false,
        }
    }
}
