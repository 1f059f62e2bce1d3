//! The syncer: the only task that writes to the catalog.
//!
//! Each pass lists the catalog, snapshots the [`DesiredStore`], computes a
//! [`ReconcilePlan`] and executes it one entry at a time. A failing entry is
//! recorded in the [`PassSummary`] and never stops the rest of the pass.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use catsync_catalog::{CatalogClient, CatalogError, ListFilter};
use catsync_core::{CatalogRegistration, ServiceKey, SyncerConfig};

use crate::{
    error::SyncError,
    plan::{compute_plan, Conflict, ReconcilePlan},
    retry::{retry_with_backoff, RetryPolicy},
    signal::ChangeReceiver,
    store::DesiredStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Register,
    Deregister,
}

/// One catalog write that did not succeed within its retry budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedAction {
    pub action: Action,
    pub id: String,
    pub key: Option<ServiceKey>,
    pub error: String,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub registered: Vec<String>,
    pub deregistered: Vec<String>,
    pub unchanged: usize,
    pub conflicts: Vec<Conflict>,
    pub failures: Vec<FailedAction>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl PassSummary {
    fn started() -> Self {
        Self {
            registered: Vec::new(),
            deregistered: Vec::new(),
            unchanged: 0,
            conflicts: Vec::new(),
            failures: Vec::new(),
            duration_ms: 0,
            completed_at: Utc::now(),
        }
    }

    /// Every planned action succeeded and nothing conflicted.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.conflicts.is_empty()
    }
}

/// Progress published by a running syncer.
#[derive(Debug, Clone, Default)]
pub struct PassStatus {
    /// Passes that ran to completion, with or without entry failures.
    pub completed: u64,
    /// Passes abandoned because the catalog could not be listed.
    pub deferred: u64,
    pub last: Option<PassSummary>,
}

pub struct Syncer {
    client: Arc<dyn CatalogClient>,
    store: DesiredStore,
    owner: String,
    config: SyncerConfig,
    retry: RetryPolicy,
}

impl Syncer {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        store: DesiredStore,
        owner: impl Into<String>,
        config: SyncerConfig,
    ) -> Self {
        let retry = RetryPolicy::from_config(&config);
        Self {
            client,
            store,
            owner: owner.into(),
            config,
            retry,
        }
    }

    /// Compute what a pass would do, without writing anything.
    pub async fn plan(&self) -> Result<ReconcilePlan, SyncError> {
        let deadline = Instant::now() + self.config.poll_interval;
        let actual = self.list_actual(deadline).await?;
        let desired = self.store.snapshot().await;
        Ok(compute_plan(&self.owner, &desired, &actual))
    }

    /// Run one reconciliation pass.
    ///
    /// Only a failure to list the catalog is returned as an error; per-entry
    /// failures land in [`PassSummary::failures`].
    pub async fn reconcile(&self) -> Result<PassSummary, SyncError> {
        let started = Instant::now();
        let deadline = started + self.config.poll_interval;

        let actual = self.list_actual(deadline).await?;
        let desired = self.store.snapshot().await;
        let plan = compute_plan(&self.owner, &desired, &actual);

        let mut summary = PassSummary::started();
        summary.unchanged = plan.unchanged;

        for conflict in &plan.conflicts {
            warn!(
                key = %conflict.key,
                id = %conflict.id,
                owner = conflict.owner.as_deref().unwrap_or("<none>"),
                "catalog id held by an entry this syncer does not own; skipping"
            );
        }
        summary.conflicts = plan.conflicts;

        for item in &plan.deregister {
            let id = item.id.as_str();
            let result = retry_with_backoff(&self.retry, Some(deadline), "deregister", move || {
                self.timed(self.client.deregister(id))
            })
            .await;
            match result {
                Ok(()) => {
                    info!(id = %item.id, key = ?item.key, "deregistered stale entry");
                    summary.deregistered.push(item.id.clone());
                }
                Err(err) => {
                    error!(id = %item.id, key = ?item.key, error = %err, "deregister failed");
                    summary.failures.push(FailedAction {
                        action: Action::Deregister,
                        id: item.id.clone(),
                        key: item.key.clone(),
                        error: err.to_string(),
                    });
                }
            }
        }

        for item in &plan.register {
            let registration: &CatalogRegistration = &item.registration;
            let result = retry_with_backoff(&self.retry, Some(deadline), "register", move || {
                self.timed(self.client.register(registration))
            })
            .await;
            match result {
                Ok(()) => {
                    info!(
                        key = %item.key,
                        id = %registration.id,
                        port = registration.port,
                        overwrite = item.existing,
                        "registered"
                    );
                    summary.registered.push(registration.id.clone());
                }
                Err(err) => {
                    error!(key = %item.key, id = %registration.id, error = %err, "register failed");
                    summary.failures.push(FailedAction {
                        action: Action::Register,
                        id: registration.id.clone(),
                        key: Some(item.key.clone()),
                        error: err.to_string(),
                    });
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        summary.completed_at = Utc::now();
        Ok(summary)
    }

    /// Probe the catalog, then spawn the reconciliation loop.
    ///
    /// A failed probe is returned to the caller and nothing is spawned.
    pub async fn start(self, changes: ChangeReceiver) -> Result<SyncerHandle, SyncError> {
        let filter = ListFilter::all();
        self.timed(self.client.list(&filter))
            .await
            .map_err(SyncError::CatalogUnavailable)?;

        let (shutdown, shutdown_rx) = broadcast::channel::<()>(1);
        let (status_tx, status) = watch::channel(PassStatus::default());
        let join = tokio::spawn(self.run(changes, shutdown_rx, status_tx));
        Ok(SyncerHandle {
            shutdown,
            join,
            status,
        })
    }

    async fn run(
        self,
        mut changes: ChangeReceiver,
        mut shutdown: broadcast::Receiver<()>,
        status: watch::Sender<PassStatus>,
    ) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut signal_open = true;

        info!(
            owner = %self.owner,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "syncer started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => debug!("poll interval elapsed"),
                changed = changes.changed(), if signal_open => {
                    if !changed {
                        debug!("change signal closed; polling only");
                        signal_open = false;
                        continue;
                    }
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        _ = tokio::time::sleep(self.config.debounce) => {}
                    }
                    let collapsed = changes.drain();
                    debug!(collapsed, "debounced change signals");
                }
            }

            tokio::select! {
                _ = shutdown.recv() => {
                    info!("shutdown requested; abandoning in-progress pass");
                    break;
                }
                result = self.reconcile() => self.publish(result, &status),
            }
            ticker.reset();
        }

        info!("syncer stopped");
    }

    fn publish(&self, result: Result<PassSummary, SyncError>, status: &watch::Sender<PassStatus>) {
        match result {
            Ok(summary) => {
                info!(
                    registered = summary.registered.len(),
                    deregistered = summary.deregistered.len(),
                    unchanged = summary.unchanged,
                    conflicts = summary.conflicts.len(),
                    failures = summary.failures.len(),
                    duration_ms = summary.duration_ms,
                    "reconciliation pass complete"
                );
                status.send_modify(|s| {
                    s.completed += 1;
                    s.last = Some(summary);
                });
            }
            Err(err) => {
                warn!(error = %err, "reconciliation pass deferred");
                status.send_modify(|s| s.deferred += 1);
            }
        }
    }

    async fn list_actual(&self, deadline: Instant) -> Result<Vec<CatalogRegistration>, SyncError> {
        let filter = ListFilter::all();
        let filter = &filter;
        retry_with_backoff(&self.retry, Some(deadline), "list", move || {
            self.timed(self.client.list(filter))
        })
        .await
        .map_err(SyncError::ListFailed)
    }

    async fn timed<T>(
        &self,
        call: impl Future<Output = Result<T, CatalogError>>,
    ) -> Result<T, CatalogError> {
        let limit = self.config.request_timeout;
        tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(CatalogError::Timeout(limit)))
    }
}

/// A running syncer.
pub struct SyncerHandle {
    shutdown: broadcast::Sender<()>,
    join: JoinHandle<()>,
    status: watch::Receiver<PassStatus>,
}

impl SyncerHandle {
    /// Watch pass progress.
    pub fn subscribe(&self) -> watch::Receiver<PassStatus> {
        self.status.clone()
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn stop(self) -> Result<(), SyncError> {
        // An exited loop has dropped its receiver; joining still reports panics.
        let _ = self.shutdown.send(());
        self.join
            .await
            .map_err(|err| SyncError::Join(err.to_string()))
    }
}
