//! Event-driven dispatch of resource keys to a [`Resource`].

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use catsync_core::{ControllerConfig, ServiceKey};
use catsync_sync::{MapperError, Resource};

use crate::error::DaemonError;
use crate::queue::WorkQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Applied,
    Deleted,
}

/// A change notification. Carries only the key; state is re-read at dequeue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    pub key: ServiceKey,
    pub kind: EventKind,
}

pub struct Controller<R> {
    resource: Arc<R>,
    queue: Arc<WorkQueue<ServiceKey>>,
    config: ControllerConfig,
}

impl<R: Resource> Controller<R> {
    pub fn new(resource: Arc<R>, config: ControllerConfig) -> Self {
        let queue = Arc::new(WorkQueue::new(config.base_backoff, config.max_backoff));
        Self {
            resource,
            queue,
            config,
        }
    }

    /// Replay existing keys, then dispatch events until shutdown or until the
    /// event stream ends. Every `resync_interval` the full key set is
    /// replayed again so events the transport lost are repaired. Returns
    /// after every worker has exited.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<ResourceEvent>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<(), DaemonError> {
        let kind = self.resource.kind();
        let existing = self.resource.list_keys().await?;
        info!(kind, count = existing.len(), "replaying existing resources");
        for key in existing {
            self.queue.add(key);
        }

        let workers: Vec<JoinHandle<()>> = (0..self.config.workers)
            .map(|id| {
                tokio::spawn(worker(
                    id,
                    Arc::clone(&self.resource),
                    Arc::clone(&self.queue),
                    self.config.max_retries,
                ))
            })
            .collect();
        info!(kind, workers = workers.len(), "controller started");

        let period = self.config.resync_interval;
        let mut resync = tokio::time::interval_at(Instant::now() + period, period);
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = resync.tick() => self.resync().await,
                event = events.recv() => {
                    let Some(event) = event else {
                        warn!(kind, "resource event stream closed");
                        break;
                    };
                    debug!(kind, key = %event.key, event = ?event.kind, "enqueue");
                    self.queue.add(event.key);
                }
            }
        }

        self.queue.shut_down();
        for handle in workers {
            handle
                .await
                .map_err(|err| DaemonError::Join(format!("controller worker join failure: {err}")))?;
        }
        info!(kind, "controller stopped");
        Ok(())
    }

    /// Enqueue every present and every tracked key. Present keys are
    /// upserted, tracked keys that vanished are deleted at dequeue.
    async fn resync(&self) {
        let kind = self.resource.kind();
        let present = match self.resource.list_keys().await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(kind, error = %err, "resync listing failed; retrying next period");
                return;
            }
        };
        let mut keys: BTreeSet<ServiceKey> = present.into_iter().collect();
        keys.extend(self.resource.tracked_keys().await);
        debug!(kind, count = keys.len(), "resync");
        for key in keys {
            self.queue.add(key);
        }
    }
}

async fn worker<R: Resource>(
    id: usize,
    resource: Arc<R>,
    queue: Arc<WorkQueue<ServiceKey>>,
    max_retries: u32,
) {
    let kind = resource.kind();
    while let Some(key) = queue.get().await {
        match reconcile_key(resource.as_ref(), &key).await {
            Ok(()) => queue.forget(&key),
            Err(err) => {
                let retries = queue.num_requeues(&key);
                if retries < max_retries {
                    let delay = queue.add_rate_limited(key.clone());
                    warn!(
                        kind,
                        %key,
                        attempt = retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "processing failed, requeued"
                    );
                } else {
                    error!(
                        kind,
                        %key,
                        attempts = retries + 1,
                        error = %err,
                        "processing failed after max retries, dropping key"
                    );
                    queue.forget(&key);
                }
            }
        }
        queue.done(&key);
    }
    debug!(kind, worker = id, "worker exiting");
}

async fn reconcile_key<R: Resource>(resource: &R, key: &ServiceKey) -> Result<(), MapperError> {
    if resource.exists(key).await? {
        resource.upsert(key).await
    } else {
        resource.delete(key).await
    }
}
