use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use catsync_core::ServiceKey;
use catsync_sync::registration_id;

fn catsync_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("catsync"));
    cmd.env("NO_COLOR", "1");
    cmd
}

fn write_manifest(root: &Path, ns: &str, name: &str, extra: &str) {
    let dir = root.join(ns);
    fs::create_dir_all(&dir).expect("mkdir");
    let body = format!(
        "namespace: {ns}\nname: {name}\naddresses: [10.0.0.5]\nports:\n  - name: http\n    port: 8080\ntags: [web]\n{extra}"
    );
    fs::write(dir.join(format!("{name}.yaml")), body).expect("write manifest");
}

fn write_config(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("catsync.yaml");
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn render_json_reports_registration_and_skips() {
    let manifests = TempDir::new().expect("manifests");
    write_manifest(manifests.path(), "default", "web", "");
    write_manifest(
        manifests.path(),
        "default",
        "hidden",
        "annotations:\n  catsync.dev/sync: \"false\"\n",
    );

    let assert = catsync_cmd()
        .args(["render", "--json", "--manifests"])
        .arg(manifests.path())
        .assert()
        .success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let rendered: serde_json::Value = serde_json::from_str(&stdout).expect("render JSON");
    let rows = rendered.as_array().expect("array");
    assert_eq!(rows.len(), 2);

    let web = rows
        .iter()
        .find(|r| r["key"] == "default/web")
        .expect("web row");
    let expected_id = registration_id("catsync", &ServiceKey::new("default", "web").expect("key"));
    assert_eq!(web["registration"]["id"], expected_id.as_str());
    assert_eq!(web["registration"]["port"], 8080);
    assert_eq!(web["registration"]["meta"]["catsync-owner"], "catsync");

    let hidden = rows
        .iter()
        .find(|r| r["key"] == "default/hidden")
        .expect("hidden row");
    assert!(hidden.get("registration").is_none());
    assert_eq!(hidden["skipped"], "sync disabled by policy");
}

#[test]
fn render_table_shows_skipped_reason() {
    let manifests = TempDir::new().expect("manifests");
    write_manifest(manifests.path(), "kube-system", "dns", "");

    catsync_cmd()
        .args(["render", "--manifests"])
        .arg(manifests.path())
        .assert()
        .success()
        .stdout(contains("kube-system/dns"))
        .stdout(contains("skipped"));
}

#[test]
fn plan_offline_registers_everything() {
    let manifests = TempDir::new().expect("manifests");
    write_manifest(manifests.path(), "default", "web", "");

    catsync_cmd()
        .args(["plan", "--offline", "--manifests"])
        .arg(manifests.path())
        .assert()
        .success()
        .stdout(contains("1 to register"))
        .stdout(contains("default/web"));
}

#[test]
fn plan_offline_empty_directory_is_in_sync() {
    let manifests = TempDir::new().expect("manifests");

    catsync_cmd()
        .args(["plan", "--offline", "--manifests"])
        .arg(manifests.path())
        .assert()
        .success()
        .stdout(contains("Catalog is in sync."));
}

#[test]
fn run_rejects_unsupported_direction() {
    let dir = TempDir::new().expect("dir");
    let config = write_config(dir.path(), "direction: both\n");

    catsync_cmd()
        .arg("run")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("not supported"));
}

#[test]
fn missing_config_file_is_reported() {
    let dir = TempDir::new().expect("dir");

    catsync_cmd()
        .args(["plan", "--offline", "--config"])
        .arg(dir.path().join("absent.yaml"))
        .assert()
        .failure()
        .stderr(contains("config not found"));
}

#[test]
fn catalog_list_fails_when_agent_unreachable() {
    let dir = TempDir::new().expect("dir");
    let config = write_config(
        dir.path(),
        "catalog:\n  address: http://127.0.0.1:1\n  request_timeout: 2s\n",
    );

    catsync_cmd()
        .args(["catalog", "list", "--config"])
        .arg(&config)
        .assert()
        .failure()
        .stderr(contains("failed to list catalog"));
}

#[test]
fn plan_logs_malformed_manifests_to_stderr() {
    let manifests = TempDir::new().expect("manifests");
    write_manifest(manifests.path(), "default", "web", "");
    fs::write(manifests.path().join("default/broken.yaml"), "ports: [[[").expect("write broken");

    let assert = catsync_cmd()
        .env_remove("RUST_LOG")
        .args(["plan", "--offline", "--json", "--manifests"])
        .arg(manifests.path())
        .assert()
        .success()
        .stderr(contains("skipping malformed service"));
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).expect("stdout utf8");
    let plan: serde_json::Value = serde_json::from_str(&stdout).expect("logs stay off stdout");
    assert_eq!(plan["register"].as_array().expect("register").len(), 1);
}
