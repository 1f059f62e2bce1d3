//! Desired-state store: the registrations the engine believes should exist.
//!
//! Mutated concurrently by mapper calls from controller workers, read by the
//! syncer through [`DesiredStore::snapshot`]. Callers never see the map itself,
//! and no lock is held past the end of a method.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tokio::sync::RwLock;

use catsync_core::{CatalogRegistration, ServiceKey};

#[derive(Debug, Clone, Default)]
pub struct DesiredStore {
    inner: Arc<RwLock<HashMap<ServiceKey, CatalogRegistration>>>,
}

impl DesiredStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `registration` under `key`, replacing any previous value.
    ///
    /// Returns `true` when the stored value changed.
    pub async fn upsert(&self, key: ServiceKey, registration: CatalogRegistration) -> bool {
        let mut guard = self.inner.write().await;
        match guard.get(&key) {
            Some(existing) if existing.same_as(&registration) => false,
            _ => {
                guard.insert(key, registration);
                true
            }
        }
    }

    /// Returns `true` when an entry was removed.
    pub async fn remove(&self, key: &ServiceKey) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    pub async fn get(&self, key: &ServiceKey) -> Option<CatalogRegistration> {
        self.inner.read().await.get(key).cloned()
    }

    /// Point-in-time copy, ordered by key.
    pub async fn snapshot(&self) -> BTreeMap<ServiceKey, CatalogRegistration> {
        let guard = self.inner.read().await;
        guard
            .iter()
            .map(|(key, reg)| (key.clone(), reg.clone()))
            .collect()
    }

    /// Keys with a desired registration, ordered.
    pub async fn keys(&self) -> Vec<ServiceKey> {
        self.inner.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}
