//! Subcommand implementations and the helpers they share.

pub mod catalog;
pub mod plan;
pub mod render;
pub mod run;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};

use catsync_core::SyncConfig;
use catsync_daemon::ManifestSource;
use catsync_sync::{change_channel, DesiredStore, Resource, ServiceMapper};

/// Load and validate config; defaults when no file is given.
pub fn load_config(path: Option<&Path>, manifests: Option<PathBuf>) -> Result<SyncConfig> {
    let mut config = match path {
        Some(path) => SyncConfig::load_at(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SyncConfig::default(),
    };
    if let Some(dir) = manifests {
        config.source.manifest_dir = dir;
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Drive `future` to completion on a single-threaded runtime.
pub fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    Ok(runtime.block_on(future))
}

/// Map every manifest once into a fresh store, the way the engine does at
/// startup.
pub async fn desired_state(config: &SyncConfig) -> Result<DesiredStore> {
    let source = Arc::new(ManifestSource::new(&config.source.manifest_dir));
    let store = DesiredStore::new();
    // Nothing listens; the mapper's change notifications are dropped.
    let (signal, _changes) = change_channel();
    let mapper = ServiceMapper::new(
        source,
        store.clone(),
        signal,
        config.owner.clone(),
        config.mapper.clone(),
    );
    let keys = mapper.list_keys().await.with_context(|| {
        format!(
            "failed to list manifests under {}",
            config.source.manifest_dir.display()
        )
    })?;
    for key in &keys {
        mapper
            .upsert(key)
            .await
            .with_context(|| format!("failed to map {key}"))?;
    }
    Ok(store)
}
