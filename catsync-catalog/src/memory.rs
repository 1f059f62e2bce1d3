//! In-memory catalog with failure injection.
//!
//! Used by the engine's tests and by `catsync plan --offline`.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use catsync_core::CatalogRegistration;

use crate::client::{CatalogClient, ListFilter};
use crate::error::CatalogError;

/// One call observed by a [`MemoryCatalog`], in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogCall {
    Register(String),
    Deregister(String),
    List,
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    remaining: u32,
    error: CatalogError,
}

impl InjectedFailure {
    fn take(&mut self) -> Option<CatalogError> {
        if self.remaining == 0 {
            return None;
        }
        if self.remaining != u32::MAX {
            self.remaining -= 1;
        }
        Some(self.error.clone())
    }
}

#[derive(Default)]
struct State {
    entries: BTreeMap<String, CatalogRegistration>,
    register_failures: HashMap<String, InjectedFailure>,
    deregister_failures: HashMap<String, InjectedFailure>,
    list_failure: Option<InjectedFailure>,
    calls: Vec<CatalogCall>,
}

#[derive(Default)]
pub struct MemoryCatalog {
    state: Mutex<State>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: impl IntoIterator<Item = CatalogRegistration>) -> Self {
        let catalog = Self::new();
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    /// Insert directly, bypassing failure injection and the call log.
    pub fn insert(&self, entry: CatalogRegistration) {
        self.lock().entries.insert(entry.id.clone(), entry);
    }

    pub fn get(&self, id: &str) -> Option<CatalogRegistration> {
        self.lock().entries.get(id).cloned()
    }

    pub fn entries(&self) -> Vec<CatalogRegistration> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<CatalogCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Fail the next `times` register calls for `id` (`u32::MAX` = forever).
    pub fn fail_register(&self, id: &str, times: u32, error: CatalogError) {
        self.lock().register_failures.insert(
            id.to_string(),
            InjectedFailure {
                remaining: times,
                error,
            },
        );
    }

    pub fn fail_deregister(&self, id: &str, times: u32, error: CatalogError) {
        self.lock().deregister_failures.insert(
            id.to_string(),
            InjectedFailure {
                remaining: times,
                error,
            },
        );
    }

    pub fn fail_list(&self, times: u32, error: CatalogError) {
        self.lock().list_failure = Some(InjectedFailure {
            remaining: times,
            error,
        });
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CatalogClient for MemoryCatalog {
    async fn register(&self, registration: &CatalogRegistration) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state
            .calls
            .push(CatalogCall::Register(registration.id.clone()));
        if let Some(err) = state
            .register_failures
            .get_mut(&registration.id)
            .and_then(InjectedFailure::take)
        {
            return Err(err);
        }
        state
            .entries
            .insert(registration.id.clone(), registration.clone());
        Ok(())
    }

    async fn deregister(&self, id: &str) -> Result<(), CatalogError> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::Deregister(id.to_string()));
        if let Some(err) = state
            .deregister_failures
            .get_mut(id)
            .and_then(InjectedFailure::take)
        {
            return Err(err);
        }
        state.entries.remove(id);
        Ok(())
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<CatalogRegistration>, CatalogError> {
        let mut state = self.lock();
        state.calls.push(CatalogCall::List);
        if let Some(err) = state.list_failure.as_mut().and_then(InjectedFailure::take) {
            return Err(err);
        }
        Ok(state
            .entries
            .values()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect())
    }
}
