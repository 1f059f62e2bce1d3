use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

use catsync_catalog::{CatalogClient, HttpCatalog};
use catsync_core::{ControllerConfig, SyncConfig};
use catsync_sync::{change_channel, DesiredStore, Resource, ServiceMapper, Syncer};

use crate::controller::{Controller, ResourceEvent};
use crate::error::{io_err, DaemonError};
use crate::queue::exponential_backoff;
use crate::source::{watch_manifests, ManifestSource};

const EVENT_BUFFER: usize = 256;

/// Start a runtime and block the current thread until the engine exits.
pub fn start_blocking(config: SyncConfig) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run against the catalog agent named in `config` until ctrl-c.
pub async fn run(config: SyncConfig) -> Result<(), DaemonError> {
    config.validate()?;
    let catalog: Arc<dyn CatalogClient> = Arc::new(HttpCatalog::new(&config.catalog)?);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);
    run_with(config, catalog, shutdown_tx).await
}

/// Compose the engine around `catalog` and run it until `shutdown` fires.
///
/// Startup order: watcher (so no event is lost), desired-state priming (so
/// the first pass does not deregister live services), syncer, controller.
pub async fn run_with(
    config: SyncConfig,
    catalog: Arc<dyn CatalogClient>,
    shutdown: broadcast::Sender<()>,
) -> Result<(), DaemonError> {
    config.validate()?;

    let source = Arc::new(ManifestSource::new(&config.source.manifest_dir));
    let store = DesiredStore::new();
    let (signal, changes) = change_channel();
    let mapper = Arc::new(ServiceMapper::new(
        Arc::clone(&source),
        store.clone(),
        signal,
        config.owner.clone(),
        config.mapper.clone(),
    ));

    let (event_tx, event_rx) = mpsc::channel::<ResourceEvent>(EVENT_BUFFER);

    let watcher_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let root = source.root().to_path_buf();
        tokio::spawn(async move {
            let result = watch_manifests(root, event_tx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    if let Err(err) = prime_desired_state(mapper.as_ref(), &config.controller).await {
        let _ = shutdown.send(());
        let _ = watcher_handle.await;
        return Err(err);
    }

    let syncer = Syncer::new(catalog, store, config.owner.clone(), config.syncer.clone());
    let syncer_handle = match syncer.start(changes).await {
        Ok(handle) => handle,
        Err(err) => {
            let _ = shutdown.send(());
            let _ = watcher_handle.await;
            return Err(DaemonError::Startup(err));
        }
    };

    let controller_handle = {
        let shutdown = shutdown.clone();
        let shutdown_rx = shutdown.subscribe();
        let controller = Controller::new(Arc::clone(&mapper), config.controller.clone());
        tokio::spawn(async move {
            let result = controller.run(event_rx, shutdown_rx).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown.clone();
        let mut shutdown_rx = shutdown.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(io_err("ctrl-c handler", err)),
                    }
                }
            }
        })
    };

    tracing::info!(
        owner = %config.owner,
        manifests = %source.root().display(),
        "catsync engine running"
    );

    let (watcher_result, controller_result, signal_result) =
        tokio::join!(watcher_handle, controller_handle, signal_handle);
    let syncer_result = syncer_handle.stop().await;

    handle_join("watcher", watcher_result)?;
    handle_join("controller", controller_result)?;
    handle_join("signal_handler", signal_result)?;
    syncer_result?;
    tracing::info!("catsync engine stopped");
    Ok(())
}

/// Map every existing resource once before the first reconciliation pass.
///
/// A key whose mapping fails is retried with the controller's backoff. If it
/// still fails, startup fails: running the first pass without it would
/// deregister a live service.
async fn prime_desired_state<R: Resource>(
    resource: &R,
    config: &ControllerConfig,
) -> Result<(), DaemonError> {
    let keys = resource.list_keys().await?;
    for key in &keys {
        let mut failures = 0;
        while let Err(err) = resource.upsert(key).await {
            if failures >= config.max_retries {
                tracing::error!(%key, attempts = failures + 1, error = %err, "initial mapping failed");
                return Err(err.into());
            }
            failures += 1;
            let delay = exponential_backoff(config.base_backoff, config.max_backoff, failures);
            tracing::warn!(
                %key,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "initial mapping failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
    tracing::info!(count = keys.len(), "desired state primed");
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Join(format!("{task} task join failure: {err}"))),
    }
}

/// Install the process-wide subscriber, writing to stderr; `RUST_LOG`
/// overrides the `info` default. `CATSYNC_LOG_FORMAT=json` switches to JSON
/// lines. Later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CATSYNC_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let _ = if json {
        fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::time::Duration;

    use catsync_core::{ClusterService, MapperConfig, ServiceKey, ServicePort, SyncPolicy};
    use catsync_sync::MemorySource;

    use super::*;

    fn service(name: &str) -> ClusterService {
        ClusterService {
            key: ServiceKey::new("default", name).expect("key"),
            addresses: vec!["10.0.0.5".to_string()],
            ports: vec![ServicePort {
                name: None,
                port: 8080,
            }],
            tags: vec![],
            labels: BTreeMap::new(),
            policy: SyncPolicy::default(),
        }
    }

    fn mapper(source: Arc<MemorySource>) -> ServiceMapper<MemorySource> {
        let (signal, _changes) = change_channel();
        ServiceMapper::new(
            source,
            DesiredStore::new(),
            signal,
            "catsync",
            MapperConfig::default(),
        )
    }

    fn controller_config(max_retries: u32) -> ControllerConfig {
        ControllerConfig {
            max_retries,
            base_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(100),
            ..ControllerConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn priming_retries_transient_failures() {
        let source = Arc::new(MemorySource::new());
        source.apply(service("web"));
        source.apply(service("api"));
        let web = ServiceKey::new("default", "web").expect("key");
        source.fail_next(&web, 2);
        let mapper = mapper(source);

        prime_desired_state(&mapper, &controller_config(3))
            .await
            .expect("primed after retries");
        assert_eq!(mapper.store().len().await, 2);
        assert!(mapper.store().get(&web).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn priming_fails_when_retries_are_spent() {
        let source = Arc::new(MemorySource::new());
        source.apply(service("web"));
        let web = ServiceKey::new("default", "web").expect("key");
        source.fail_next(&web, u32::MAX);
        let mapper = mapper(source);

        let err = prime_desired_state(&mapper, &controller_config(2))
            .await
            .expect_err("persistent failure aborts startup");
        assert!(matches!(err, DaemonError::Mapper(_)), "{err}");
        assert!(mapper.store().is_empty().await);
    }
}
