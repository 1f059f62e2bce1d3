//! Read access to current cluster resource state.
//!
//! The mapper always re-reads the resource by key instead of trusting event
//! payloads, so a late event for a resource that has since changed still
//! produces the right registration.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use catsync_core::{ClusterService, MalformedResource, ServiceKey};

use crate::error::SourceError;

#[async_trait]
pub trait ServiceSource: Send + Sync + 'static {
    /// Current state of `key`, or `None` if it no longer exists.
    async fn get(&self, key: &ServiceKey) -> Result<Option<ClusterService>, SourceError>;

    /// Whether `key` currently exists, malformed or not.
    async fn contains(&self, key: &ServiceKey) -> Result<bool, SourceError>;

    /// Every key currently present.
    async fn list_keys(&self) -> Result<Vec<ServiceKey>, SourceError>;
}

#[derive(Debug, Clone)]
enum Slot {
    Ready(ClusterService),
    Malformed(MalformedResource),
}

#[derive(Default)]
struct State {
    services: BTreeMap<ServiceKey, Slot>,
    failures: HashMap<ServiceKey, u32>,
}

/// An in-process [`ServiceSource`] for tests and embedding.
#[derive(Default)]
pub struct MemorySource {
    state: Mutex<State>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, service: ClusterService) {
        self.lock()
            .services
            .insert(service.key.clone(), Slot::Ready(service));
    }

    pub fn remove(&self, key: &ServiceKey) -> bool {
        self.lock().services.remove(key).is_some()
    }

    /// Store a resource that exists but fails to parse.
    pub fn insert_malformed(&self, key: ServiceKey, reason: MalformedResource) {
        self.lock().services.insert(key, Slot::Malformed(reason));
    }

    /// Fail the next `times` reads of `key` with a backend error.
    pub fn fail_next(&self, key: &ServiceKey, times: u32) {
        self.lock().failures.insert(key.clone(), times);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take_failure(state: &mut State, key: &ServiceKey) -> Result<(), SourceError> {
        match state.failures.get_mut(key) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(SourceError::Backend(format!("injected read failure for {key}")))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ServiceSource for MemorySource {
    async fn get(&self, key: &ServiceKey) -> Result<Option<ClusterService>, SourceError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, key)?;
        match state.services.get(key) {
            None => Ok(None),
            Some(Slot::Ready(service)) => Ok(Some(service.clone())),
            Some(Slot::Malformed(reason)) => Err(SourceError::Malformed {
                key: key.to_string(),
                reason: reason.clone(),
            }),
        }
    }

    async fn contains(&self, key: &ServiceKey) -> Result<bool, SourceError> {
        let mut state = self.lock();
        Self::take_failure(&mut state, key)?;
        Ok(state.services.contains_key(key))
    }

    async fn list_keys(&self) -> Result<Vec<ServiceKey>, SourceError> {
        Ok(self.lock().services.keys().cloned().collect())
    }
}
