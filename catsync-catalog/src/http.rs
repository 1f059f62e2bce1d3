//! Catalog agent HTTP adapter.
//!
//! Endpoints used:
//!
//! ```text
//! PUT /v1/agent/service/register            body: AgentServiceRegistration
//! PUT /v1/agent/service/deregister/<id>
//! GET /v1/agent/services                    -> { "<id>": AgentService, ... }
//! ```
//!
//! `ureq` is blocking; every call runs on the blocking pool so the syncer
//! task never stalls the runtime.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use catsync_core::{CatalogConfig, CatalogRegistration};

use crate::client::{CatalogClient, ListFilter};
use crate::error::CatalogError;

/// ACL token header understood by the agent.
pub const TOKEN_HEADER: &str = "X-Consul-Token";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AgentServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: &'a str,
    name: &'a str,
    address: &'a str,
    port: u16,
    tags: &'a [String],
    meta: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a CatalogRegistration> for AgentServiceRegistration<'a> {
    fn from(reg: &'a CatalogRegistration) -> Self {
        Self {
            id: &reg.id,
            name: &reg.name,
            address: &reg.address,
            port: reg.port,
            tags: &reg.tags,
            meta: &reg.meta,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AgentService {
    #[serde(rename = "ID")]
    id: String,
    service: String,
    #[serde(default)]
    address: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    meta: Option<BTreeMap<String, String>>,
}

impl From<AgentService> for CatalogRegistration {
    fn from(svc: AgentService) -> Self {
        Self {
            id: svc.id,
            name: svc.service,
            address: svc.address,
            port: svc.port,
            tags: svc.tags.unwrap_or_default(),
            meta: svc.meta.unwrap_or_default(),
        }
    }
}

/// [`CatalogClient`] backed by the agent HTTP API.
#[derive(Clone)]
pub struct HttpCatalog {
    agent: ureq::Agent,
    base: String,
    token: Option<String>,
}

impl HttpCatalog {
    /// Build a client. Fails only on an unusable address; no request is sent.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        let base = config.address.trim().trim_end_matches('/').to_string();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CatalogError::InvalidAddress(config.address.clone()));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout(config.request_timeout)
            .build();
        Ok(Self {
            agent,
            base,
            token: config.token.clone().filter(|t| !t.is_empty()),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn put(&self, path: &str) -> ureq::Request {
        self.with_token(self.agent.put(&self.url(path)))
    }

    fn get(&self, path: &str) -> ureq::Request {
        self.with_token(self.agent.get(&self.url(path)))
    }

    fn with_token(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set(TOKEN_HEADER, token),
            None => request,
        }
    }
}

#[async_trait]
impl CatalogClient for HttpCatalog {
    async fn register(&self, registration: &CatalogRegistration) -> Result<(), CatalogError> {
        let body = serde_json::to_value(AgentServiceRegistration::from(registration))
            .map_err(|e| CatalogError::Decode(e.to_string()))?;
        let request = self.put("/v1/agent/service/register");
        blocking(move || {
            request.send_json(body).map_err(map_ureq_error)?;
            Ok(())
        })
        .await
    }

    async fn deregister(&self, id: &str) -> Result<(), CatalogError> {
        let request = self.put(&format!("/v1/agent/service/deregister/{id}"));
        blocking(move || match request.call() {
            Ok(_) => Ok(()),
            // Already gone.
            Err(ureq::Error::Status(404, _)) => Ok(()),
            Err(err) => Err(map_ureq_error(err)),
        })
        .await
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<CatalogRegistration>, CatalogError> {
        let request = self.get("/v1/agent/services");
        let body = blocking(move || {
            let response = request.call().map_err(map_ureq_error)?;
            response
                .into_string()
                .map_err(|e| CatalogError::Transport(e.to_string()))
        })
        .await?;
        let mut entries = decode_services(&body)?;
        entries.retain(|entry| filter.matches(entry));
        Ok(entries)
    }
}

/// Decode a `GET /v1/agent/services` body, sorted by id.
fn decode_services(body: &str) -> Result<Vec<CatalogRegistration>, CatalogError> {
    let services: HashMap<String, AgentService> =
        serde_json::from_str(body).map_err(|e| CatalogError::Decode(e.to_string()))?;
    let mut entries: Vec<CatalogRegistration> =
        services.into_values().map(CatalogRegistration::from).collect();
    entries.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(entries)
}

fn map_ureq_error(err: ureq::Error) -> CatalogError {
    match err {
        ureq::Error::Status(status, response) => CatalogError::Status {
            status,
            body: response.into_string().unwrap_or_default(),
        },
        ureq::Error::Transport(transport) => CatalogError::Transport(transport.to_string()),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, CatalogError>
where
    F: FnOnce() -> Result<T, CatalogError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|err| CatalogError::Join(err.to_string()))?
}
