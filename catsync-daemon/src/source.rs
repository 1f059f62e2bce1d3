//! Manifest-directory watch transport.
//!
//! Each service lives at `<root>/<namespace>/<name>.yaml`. The directory is
//! the cluster's service registry as far as the engine is concerned: the
//! watcher turns filesystem events into [`ResourceEvent`]s, and
//! [`ManifestSource`] answers reads by key.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{broadcast, mpsc};

use catsync_core::{ClusterService, MalformedResource, ServiceKey, ServiceManifest};
use catsync_sync::{
    error::{io_err as source_io_err, SourceError},
    ServiceSource,
};

use crate::controller::{EventKind as ResourceEventKind, ResourceEvent};
use crate::error::{io_err, DaemonError};

const MANIFEST_EXT: &str = "yaml";

#[derive(Debug, Clone)]
pub struct ManifestSource {
    root: PathBuf,
}

impl ManifestSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, key: &ServiceKey) -> PathBuf {
        self.root
            .join(&key.namespace)
            .join(format!("{}.{MANIFEST_EXT}", key.name))
    }

    async fn read(&self, key: &ServiceKey) -> Result<Option<String>, SourceError> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(source_io_err(path, err)),
        }
    }
}

/// Map a manifest path under `root` back to its key.
///
/// Anything that is not exactly `<namespace>/<name>.yaml` below `root` is
/// ignored.
pub fn key_for_path(root: &Path, path: &Path) -> Option<ServiceKey> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<&str> = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<_>>()?;
    let [namespace, file] = parts.as_slice() else {
        return None;
    };
    let name = file.strip_suffix(&format!(".{MANIFEST_EXT}"))?;
    ServiceKey::new(*namespace, name).ok()
}

#[async_trait]
impl ServiceSource for ManifestSource {
    async fn get(&self, key: &ServiceKey) -> Result<Option<ClusterService>, SourceError> {
        let Some(contents) = self.read(key).await? else {
            return Ok(None);
        };
        let malformed = |reason| SourceError::Malformed {
            key: key.to_string(),
            reason,
        };

        let manifest = ServiceManifest::from_yaml(&contents).map_err(malformed)?;
        if manifest.namespace != key.namespace || manifest.name != key.name {
            return Err(malformed(MalformedResource::InvalidKey {
                value: format!("{}/{}", manifest.namespace, manifest.name),
                reason: "manifest identity does not match its path",
            }));
        }
        ClusterService::from_manifest(manifest)
            .map(Some)
            .map_err(malformed)
    }

    async fn contains(&self, key: &ServiceKey) -> Result<bool, SourceError> {
        let path = self.path_for(key);
        tokio::fs::try_exists(&path)
            .await
            .map_err(|e| source_io_err(path, e))
    }

    async fn list_keys(&self) -> Result<Vec<ServiceKey>, SourceError> {
        let mut keys = Vec::new();
        let mut namespaces = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(keys),
            Err(err) => return Err(source_io_err(&self.root, err)),
        };
        while let Some(ns) = namespaces
            .next_entry()
            .await
            .map_err(|e| source_io_err(&self.root, e))?
        {
            let ns_path = ns.path();
            if !ns_path.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(&ns_path)
                .await
                .map_err(|e| source_io_err(&ns_path, e))?;
            while let Some(file) = files
                .next_entry()
                .await
                .map_err(|e| source_io_err(&ns_path, e))?
            {
                match key_for_path(&self.root, &file.path()) {
                    Some(key) => keys.push(key),
                    None => tracing::debug!(path = %file.path().display(), "ignoring non-manifest file"),
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Forward manifest changes under `root` as resource events until shutdown.
pub async fn watch_manifests(
    root: PathBuf,
    events: mpsc::Sender<ResourceEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    if !root.exists() {
        std::fs::create_dir_all(&root).map_err(|e| io_err(&root, e))?;
    }
    // Event paths arrive canonicalized on some platforms.
    let root = std::fs::canonicalize(&root).unwrap_or(root);

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher: RecommendedWatcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    tracing::info!(root = %root.display(), "watching service manifests");

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if event.need_rescan() {
                    tracing::warn!(root = %root.display(), "watcher dropped events, rescanning manifests");
                    let keys = ManifestSource::new(&root).list_keys().await.unwrap_or_else(|err| {
                        tracing::warn!(error = %err, "rescan failed; left to the periodic resync");
                        Vec::new()
                    });
                    for key in keys {
                        forward(&events, key, ResourceEventKind::Applied).await?;
                    }
                    continue;
                }
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }
                let created = matches!(event.kind, EventKind::Create(_));
                for path in event.paths {
                    // Files written into a fresh namespace directory can land
                    // before the watch on it is in place.
                    if created && is_namespace_dir(&root, &path) {
                        for key in namespace_manifests(&root, &path).await {
                            forward(&events, key, ResourceEventKind::Applied).await?;
                        }
                        continue;
                    }
                    let Some(key) = key_for_path(&root, &path) else { continue };
                    let kind = if path.exists() {
                        ResourceEventKind::Applied
                    } else {
                        ResourceEventKind::Deleted
                    };
                    forward(&events, key, kind).await?;
                }
            }
        }
    }

    Ok(())
}

async fn forward(
    events: &mpsc::Sender<ResourceEvent>,
    key: ServiceKey,
    kind: ResourceEventKind,
) -> Result<(), DaemonError> {
    tracing::debug!(%key, ?kind, "manifest changed");
    events
        .send(ResourceEvent { key, kind })
        .await
        .map_err(|_| DaemonError::ChannelClosed("resource events"))
}

fn is_namespace_dir(root: &Path, path: &Path) -> bool {
    path.parent() == Some(root) && path.is_dir()
}

/// Keys of the manifests currently inside one namespace directory.
async fn namespace_manifests(root: &Path, dir: &Path) -> Vec<ServiceKey> {
    let mut keys = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) => {
            tracing::warn!(dir = %dir.display(), error = %err, "cannot scan new namespace");
            return keys;
        }
    };
    loop {
        match entries.next_entry().await {
            Ok(Some(entry)) => keys.extend(key_for_path(root, &entry.path())),
            Ok(None) => break,
            Err(err) => {
                tracing::warn!(dir = %dir.display(), error = %err, "cannot scan new namespace");
                break;
            }
        }
    }
    keys.sort();
    keys
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}
