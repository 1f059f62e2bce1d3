use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use catsync_catalog::{CatalogClient, CatalogError, MemoryCatalog};
use catsync_core::{
    policy::meta, CatalogRegistration, ConfigError, ServiceKey, SyncConfig, SyncDirection,
};
use catsync_daemon::{run_with, DaemonError};
use catsync_sync::registration_id;
use tempfile::TempDir;
use tokio::sync::broadcast;

fn config(manifests: &Path) -> SyncConfig {
    let mut config = SyncConfig::default();
    config.source.manifest_dir = manifests.to_path_buf();
    config.syncer.debounce = Duration::from_millis(20);
    config.syncer.poll_interval = Duration::from_secs(60);
    config.syncer.initial_backoff = Duration::from_millis(10);
    config.controller.base_backoff = Duration::from_millis(10);
    config
}

fn write_manifest(root: &Path, ns: &str, name: &str, port: u16) {
    let dir = root.join(ns);
    fs::create_dir_all(&dir).expect("mkdir");
    let body = format!(
        "namespace: {ns}\nname: {name}\naddresses: [10.0.0.5]\nports:\n  - name: http\n    port: {port}\ntags: [{name}]\n"
    );
    fs::write(dir.join(format!("{name}.yaml")), body).expect("write manifest");
}

fn id(ns: &str, name: &str) -> String {
    registration_id("catsync", &ServiceKey::new(ns, name).expect("key"))
}

async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn engine_follows_manifest_directory() {
    let dir = TempDir::new().expect("tempdir");
    write_manifest(dir.path(), "default", "web", 8080);

    let stale = CatalogRegistration {
        id: "old-0000000000000000".to_string(),
        name: "old".to_string(),
        address: "10.0.0.9".to_string(),
        port: 80,
        tags: vec![],
        meta: BTreeMap::from([(meta::OWNER.to_string(), "catsync".to_string())]),
    };
    let manual = CatalogRegistration {
        id: "manual-db".to_string(),
        meta: BTreeMap::new(),
        ..stale.clone()
    };
    let catalog = Arc::new(MemoryCatalog::with_entries(vec![stale.clone(), manual.clone()]));
    let client: Arc<dyn CatalogClient> = catalog.clone();

    let (shutdown_tx, _) = broadcast::channel(4);
    let engine = tokio::spawn(run_with(config(dir.path()), client, shutdown_tx.clone()));

    let web = id("default", "web");
    wait_until("initial registration", || catalog.get(&web).is_some()).await;
    wait_until("stale cleanup", || catalog.get(&stale.id).is_none()).await;
    assert_eq!(catalog.get(&manual.id), Some(manual.clone()));

    write_manifest(dir.path(), "default", "api", 9000);
    let api = id("default", "api");
    wait_until("watched create", || catalog.get(&api).is_some()).await;

    write_manifest(dir.path(), "default", "web", 9090);
    wait_until("watched update", || {
        catalog.get(&web).map(|e| e.port) == Some(9090)
    })
    .await;

    fs::remove_file(dir.path().join("default/web.yaml")).expect("remove");
    wait_until("watched delete", || catalog.get(&web).is_none()).await;
    assert!(catalog.get(&api).is_some());
    assert_eq!(catalog.get(&manual.id), Some(manual));

    shutdown_tx.send(()).expect("shutdown");
    tokio::time::timeout(Duration::from_secs(10), engine)
        .await
        .expect("engine exits")
        .expect("join")
        .expect("clean exit");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn manifests_in_new_namespace_directories_are_synced() {
    let dir = TempDir::new().expect("tempdir");
    let catalog = Arc::new(MemoryCatalog::new());
    let client: Arc<dyn CatalogClient> = catalog.clone();

    let (shutdown_tx, _) = broadcast::channel(4);
    let engine = tokio::spawn(run_with(config(dir.path()), client, shutdown_tx.clone()));
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Directory and manifest land back to back, faster than the watcher
    // can add the new directory.
    let namespaces: Vec<String> = (0..8).map(|n| format!("team{n}")).collect();
    for ns in &namespaces {
        write_manifest(dir.path(), ns, "api", 8080);
    }
    for ns in &namespaces {
        let api = id(ns, "api");
        wait_until(&format!("{ns}/api registration"), || catalog.get(&api).is_some()).await;
    }

    shutdown_tx.send(()).expect("shutdown");
    tokio::time::timeout(Duration::from_secs(10), engine)
        .await
        .expect("engine exits")
        .expect("join")
        .expect("clean exit");
}

#[tokio::test]
async fn unreachable_catalog_is_fatal_at_startup() {
    let dir = TempDir::new().expect("tempdir");
    let catalog = Arc::new(MemoryCatalog::new());
    catalog.fail_list(u32::MAX, CatalogError::Transport("connection refused".into()));

    let (shutdown_tx, _) = broadcast::channel(4);
    let err = run_with(config(dir.path()), catalog, shutdown_tx)
        .await
        .expect_err("startup must fail");
    assert!(matches!(err, DaemonError::Startup(_)), "{err}");
}

#[tokio::test]
async fn unsupported_direction_is_rejected_before_start() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = config(dir.path());
    config.direction = SyncDirection::Both;

    let (shutdown_tx, _) = broadcast::channel(4);
    let err = run_with(config, Arc::new(MemoryCatalog::new()), shutdown_tx)
        .await
        .expect_err("config must be rejected");
    assert!(matches!(
        err,
        DaemonError::Config(ConfigError::UnsupportedDirection(SyncDirection::Both))
    ));
}
