use std::path::PathBuf;

use thiserror::Error;

/// Error surface for the controller, the manifest watcher and the runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] catsync_core::ConfigError),

    #[error("catalog client error: {0}")]
    Catalog(#[from] catsync_catalog::CatalogError),

    /// The syncer could not start; fatal.
    #[error("startup failed: {0}")]
    Startup(#[source] catsync_sync::SyncError),

    #[error("sync error: {0}")]
    Sync(#[from] catsync_sync::SyncError),

    #[error("resource error: {0}")]
    Mapper(#[from] catsync_sync::MapperError),

    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    #[error("{0}")]
    Join(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
