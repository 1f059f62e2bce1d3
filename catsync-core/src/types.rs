//! Domain types shared by the mapper, the syncer and the catalog clients.
//!
//! A [`ClusterService`] is the derived view of one watched cluster resource; a
//! [`CatalogRegistration`] is the external catalog's unit of record.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MalformedResource;
use crate::policy::{meta, SyncPolicy};

// ---------------------------------------------------------------------------
// ServiceKey
// ---------------------------------------------------------------------------

/// Stable identity of a cluster service: `namespace/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
}

impl ServiceKey {
    /// Build a key, validating both parts as DNS labels.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<Self, MalformedResource> {
        let namespace = namespace.into();
        let name = name.into();
        validate_label(&namespace)?;
        validate_label(&name)?;
        Ok(Self { namespace, name })
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ServiceKey {
    type Err = MalformedResource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((namespace, name)) = s.split_once('/') else {
            return Err(MalformedResource::InvalidKey {
                value: s.to_string(),
                reason: "expected namespace/name",
            });
        };
        Self::new(namespace, name)
    }
}

impl TryFrom<String> for ServiceKey {
    type Error = MalformedResource;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ServiceKey> for String {
    fn from(key: ServiceKey) -> Self {
        key.to_string()
    }
}

fn validate_label(value: &str) -> Result<(), MalformedResource> {
    let reason = if value.is_empty() {
        Some("empty label")
    } else if value.len() > 63 {
        Some("label longer than 63 characters")
    } else if value.starts_with('-') || value.ends_with('-') {
        Some("label must start and end with an alphanumeric character")
    } else if !value
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        Some("label may only contain lowercase alphanumerics and '-'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(MalformedResource::InvalidKey {
            value: value.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Cluster side
// ---------------------------------------------------------------------------

/// One port exposed by a cluster service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePort {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub port: u16,
}

/// On-the-wire shape of a watched service resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceManifest {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub addresses: Vec<String>,
    #[serde(default)]
    pub ports: Vec<ServicePort>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
}

impl ServiceManifest {
    pub fn from_yaml(contents: &str) -> Result<Self, MalformedResource> {
        serde_yaml::from_str(contents).map_err(|e| MalformedResource::Manifest(e.to_string()))
    }
}

/// Derived view of a watched cluster resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterService {
    pub key: ServiceKey,
    pub addresses: Vec<String>,
    pub ports: Vec<ServicePort>,
    pub tags: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub policy: SyncPolicy,
}

impl ClusterService {
    /// Validate the key and parse policy annotations.
    pub fn from_manifest(manifest: ServiceManifest) -> Result<Self, MalformedResource> {
        let key = ServiceKey::new(manifest.namespace, manifest.name)?;
        let policy = SyncPolicy::from_annotations(&manifest.annotations)?;
        Ok(Self {
            key,
            addresses: manifest.addresses,
            ports: manifest.ports,
            tags: manifest.tags,
            labels: manifest.labels,
            policy,
        })
    }
}

// ---------------------------------------------------------------------------
// Catalog side
// ---------------------------------------------------------------------------

/// One service instance record in the external catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRegistration {
    pub id: String,
    pub name: String,
    pub address: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl CatalogRegistration {
    /// Value of the ownership marker, if any.
    pub fn owner(&self) -> Option<&str> {
        self.meta.get(meta::OWNER).map(String::as_str)
    }

    pub fn is_owned_by(&self, owner: &str) -> bool {
        self.owner() == Some(owner)
    }

    /// The cluster key recorded in metadata when this syncer wrote the entry.
    pub fn service_key(&self) -> Option<ServiceKey> {
        let namespace = self.meta.get(meta::NAMESPACE)?;
        let name = self.meta.get(meta::NAME)?;
        ServiceKey::new(namespace.as_str(), name.as_str()).ok()
    }

    /// Field-wise equality that ignores tag order and duplicates.
    pub fn same_as(&self, other: &CatalogRegistration) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.address == other.address
            && self.port == other.port
            && self.meta == other.meta
            && self.tags.iter().collect::<BTreeSet<_>>() == other.tags.iter().collect::<BTreeSet<_>>()
    }
}
