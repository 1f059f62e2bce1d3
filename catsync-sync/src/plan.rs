//! Desired-vs-actual diff for one reconciliation pass.
//!
//! Nothing here talks to the catalog; the syncer executes the plan and
//! `catsync plan` prints it.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use catsync_core::{CatalogRegistration, ServiceKey};

/// A registration to (re)write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedRegister {
    pub key: ServiceKey,
    pub registration: CatalogRegistration,
    /// An owned entry with this id already exists but differs.
    pub existing: bool,
}

/// An owned entry with no desired counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDeregister {
    pub id: String,
    /// Cluster key recorded in the entry's metadata, when readable.
    pub key: Option<ServiceKey>,
}

/// A desired registration whose id is held by an entry this syncer does not own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub key: ServiceKey,
    pub id: String,
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    pub register: Vec<PlannedRegister>,
    pub deregister: Vec<PlannedDeregister>,
    pub conflicts: Vec<Conflict>,
    pub unchanged: usize,
}

impl ReconcilePlan {
    /// No catalog calls are needed.
    pub fn is_converged(&self) -> bool {
        self.register.is_empty() && self.deregister.is_empty()
    }
}

/// Diff `desired` against `actual` for `owner`.
///
/// Only entries carrying `owner`'s marker are ever scheduled for removal or
/// overwrite; everything else in `actual` is left alone.
pub fn compute_plan(
    owner: &str,
    desired: &BTreeMap<ServiceKey, CatalogRegistration>,
    actual: &[CatalogRegistration],
) -> ReconcilePlan {
    let by_id: HashMap<&str, &CatalogRegistration> =
        actual.iter().map(|entry| (entry.id.as_str(), entry)).collect();

    let mut plan = ReconcilePlan::default();
    for (key, wanted) in desired {
        match by_id.get(wanted.id.as_str()) {
            Some(current) if !current.is_owned_by(owner) => plan.conflicts.push(Conflict {
                key: key.clone(),
                id: wanted.id.clone(),
                owner: current.owner().map(str::to_string),
            }),
            Some(current) if current.same_as(wanted) => plan.unchanged += 1,
            found => plan.register.push(PlannedRegister {
                key: key.clone(),
                registration: wanted.clone(),
                existing: found.is_some(),
            }),
        }
    }

    let mut desired_ids: Vec<&str> = desired.values().map(|r| r.id.as_str()).collect();
    desired_ids.sort_unstable();
    for entry in actual.iter().filter(|e| e.is_owned_by(owner)) {
        if desired_ids.binary_search(&entry.id.as_str()).is_err() {
            plan.deregister.push(PlannedDeregister {
                id: entry.id.clone(),
                key: entry.service_key(),
            });
        }
    }
    plan.deregister.sort_by(|a, b| a.id.cmp(&b.id));

    plan
}
