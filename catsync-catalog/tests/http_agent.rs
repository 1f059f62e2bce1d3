//! HttpCatalog against a mocked catalog agent.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use catsync_catalog::http::TOKEN_HEADER;
use catsync_catalog::{CatalogClient, CatalogError, HttpCatalog, ListFilter};
use catsync_core::{CatalogConfig, CatalogRegistration};

fn client(address: String, token: Option<&str>) -> HttpCatalog {
    HttpCatalog::new(&CatalogConfig {
        address,
        token: token.map(str::to_string),
        request_timeout: Duration::from_secs(5),
    })
    .expect("client")
}

fn registration() -> CatalogRegistration {
    CatalogRegistration {
        id: "web-0123456789abcdef".to_string(),
        name: "web".to_string(),
        address: "10.0.0.5".to_string(),
        port: 8080,
        tags: vec!["web".to_string()],
        meta: BTreeMap::from([("catsync-owner".to_string(), "catsync".to_string())]),
    }
}

#[tokio::test]
async fn register_sends_put_with_token_and_json_body() {
    let agent = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .and(header(TOKEN_HEADER, "s3cr3t"))
        .and(body_partial_json(json!({
            "ID": "web-0123456789abcdef",
            "Name": "web",
            "Port": 8080,
            "Meta": {"catsync-owner": "catsync"},
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&agent)
        .await;

    client(agent.uri(), Some("s3cr3t"))
        .register(&registration())
        .await
        .expect("register");
}

#[tokio::test]
async fn register_without_token_omits_header() {
    let agent = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&agent)
        .await;

    client(agent.uri(), None)
        .register(&registration())
        .await
        .expect("register");

    let requests = agent.received_requests().await.expect("request recording");
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key(TOKEN_HEADER));
}

#[tokio::test]
async fn list_decodes_and_filters_by_owner() {
    let agent = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/agent/services"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "web-1": {"ID": "web-1", "Service": "web", "Address": "10.0.0.5", "Port": 8080, "Tags": ["web"], "Meta": {"catsync-owner": "catsync"}},
            "db-1": {"ID": "db-1", "Service": "db", "Address": "10.0.0.9", "Port": 5432, "Tags": null, "Meta": {}}
        })))
        .expect(2)
        .mount(&agent)
        .await;
    let catalog = client(agent.uri(), None);

    let owned = catalog
        .list(&ListFilter::owned_by("catsync"))
        .await
        .expect("list owned");
    assert_eq!(owned.len(), 1);
    assert_eq!(owned[0].id, "web-1");
    assert_eq!(owned[0].tags, vec!["web".to_string()]);

    let all = catalog.list(&ListFilter::all()).await.expect("list all");
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn server_error_maps_to_transient_status() {
    let agent = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(500).set_body_string("agent is sad"))
        .mount(&agent)
        .await;

    let err = client(agent.uri(), None)
        .register(&registration())
        .await
        .unwrap_err();
    match &err {
        CatalogError::Status { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "agent is sad");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert!(err.is_transient());
}

#[tokio::test]
async fn client_error_is_permanent() {
    let agent = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/register"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid port"))
        .mount(&agent)
        .await;

    let err = client(agent.uri(), None)
        .register(&registration())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Status { status: 400, .. }), "got {err:?}");
    assert!(!err.is_transient());
}

#[tokio::test]
async fn deregister_of_missing_entry_succeeds() {
    let agent = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/agent/service/deregister/web-0123456789abcdef"))
        .respond_with(ResponseTemplate::new(404).set_body_string("unknown service"))
        .expect(1)
        .mount(&agent)
        .await;

    client(agent.uri(), None)
        .deregister("web-0123456789abcdef")
        .await
        .expect("404 is treated as already deregistered");
}

#[tokio::test]
async fn connection_refused_is_transient() {
    let err = client("http://127.0.0.1:1".to_string(), None)
        .list(&ListFilter::all())
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::Transport(_)), "got {err:?}");
    assert!(err.is_transient());
}
