//! The resource mapper: keeps the desired-state store in step with the
//! cluster, one key at a time.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use catsync_core::{MapperConfig, ServiceKey};

use crate::{
    error::{MapperError, SourceError},
    registration::build_registration,
    signal::ChangeSignal,
    source::ServiceSource,
    store::DesiredStore,
};

/// What the controller drives for one resource kind.
///
/// `upsert` and `delete` must be idempotent: the controller may invoke
/// either any number of times for the same key.
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Short name used in logs, e.g. `"service"`.
    fn kind(&self) -> &'static str;

    /// Keys currently present in the cluster. Replayed at startup and on
    /// every resync.
    async fn list_keys(&self) -> Result<Vec<ServiceKey>, MapperError>;

    /// Keys this resource holds state for. A resync replays them alongside
    /// `list_keys` so a missed delete is noticed.
    async fn tracked_keys(&self) -> Vec<ServiceKey> {
        Vec::new()
    }

    /// Whether `key` currently exists in the cluster.
    async fn exists(&self, key: &ServiceKey) -> Result<bool, MapperError>;

    /// Recompute the desired state for an existing resource.
    async fn upsert(&self, key: &ServiceKey) -> Result<(), MapperError>;

    /// Drop the desired state for a deleted resource.
    async fn delete(&self, key: &ServiceKey) -> Result<(), MapperError>;
}

/// Maps cluster services into [`DesiredStore`] entries.
pub struct ServiceMapper<S> {
    source: Arc<S>,
    store: DesiredStore,
    signal: ChangeSignal,
    owner: String,
    config: MapperConfig,
}

impl<S: ServiceSource> ServiceMapper<S> {
    pub fn new(
        source: Arc<S>,
        store: DesiredStore,
        signal: ChangeSignal,
        owner: impl Into<String>,
        config: MapperConfig,
    ) -> Self {
        Self {
            source,
            store,
            signal,
            owner: owner.into(),
            config,
        }
    }

    pub fn store(&self) -> &DesiredStore {
        &self.store
    }

    async fn clear(&self, key: &ServiceKey) {
        if self.store.remove(key).await {
            self.signal.notify();
        }
    }
}

#[async_trait]
impl<S: ServiceSource> Resource for ServiceMapper<S> {
    fn kind(&self) -> &'static str {
        "service"
    }

    async fn list_keys(&self) -> Result<Vec<ServiceKey>, MapperError> {
        self.source.list_keys().await.map_err(MapperError::List)
    }

    async fn tracked_keys(&self) -> Vec<ServiceKey> {
        self.store.keys().await
    }

    async fn exists(&self, key: &ServiceKey) -> Result<bool, MapperError> {
        self.source
            .contains(key)
            .await
            .map_err(|source| MapperError::Source {
                key: key.clone(),
                source,
            })
    }

    async fn upsert(&self, key: &ServiceKey) -> Result<(), MapperError> {
        let service = match self.source.get(key).await {
            Ok(Some(service)) => service,
            Ok(None) => {
                // Deleted between enqueue and processing.
                debug!(%key, "service vanished before upsert");
                self.clear(key).await;
                return Ok(());
            }
            Err(SourceError::Malformed { reason, .. }) => {
                warn!(%key, error = %reason, "skipping malformed service");
                self.clear(key).await;
                return Ok(());
            }
            Err(source) => {
                return Err(MapperError::Source {
                    key: key.clone(),
                    source,
                })
            }
        };

        match build_registration(&service, &self.owner, &self.config) {
            Ok(registration) => {
                let id = registration.id.clone();
                if self.store.upsert(key.clone(), registration).await {
                    info!(%key, %id, "desired registration updated");
                    self.signal.notify();
                } else {
                    debug!(%key, %id, "desired registration unchanged");
                }
            }
            Err(skip) => {
                if skip.is_malformed() {
                    warn!(%key, reason = %skip, "service cannot be mapped");
                } else {
                    debug!(%key, reason = %skip, "service not synced");
                }
                self.clear(key).await;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &ServiceKey) -> Result<(), MapperError> {
        if self.store.remove(key).await {
            info!(%key, "desired registration removed");
            self.signal.notify();
        }
        Ok(())
    }
}
