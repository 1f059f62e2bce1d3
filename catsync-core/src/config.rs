//! Engine configuration.
//!
//! # File format
//!
//! ```yaml
//! direction: to-catalog
//! owner: catsync
//! source:
//!   manifest_dir: /var/lib/catsync/services
//! catalog:
//!   address: http://127.0.0.1:8500
//!   request_timeout: 10s
//! mapper:
//!   sync_by_default: true
//!   deny_namespaces: [kube-system]
//!   default_tags: [k8s]
//! controller:
//!   workers: 4
//! syncer:
//!   poll_interval: 30s
//!   debounce: 500ms
//! ```
//!
//! Every section is optional and falls back to [`Default`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which registry is the source of truth for which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    #[default]
    ToCatalog,
    ToCluster,
    Both,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncDirection::ToCatalog => write!(f, "to-catalog"),
            SyncDirection::ToCluster => write!(f, "to-cluster"),
            SyncDirection::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub direction: SyncDirection,
    /// Ownership marker value written to (and required on) every managed entry.
    pub owner: String,
    pub source: SourceConfig,
    pub catalog: CatalogConfig,
    pub mapper: MapperConfig,
    pub controller: ControllerConfig,
    pub syncer: SyncerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            direction: SyncDirection::ToCatalog,
            owner: "catsync".to_string(),
            source: SourceConfig::default(),
            catalog: CatalogConfig::default(),
            mapper: MapperConfig::default(),
            controller: ControllerConfig::default(),
            syncer: SyncerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Root of the `<namespace>/<name>.yaml` manifest tree.
    pub manifest_dir: PathBuf,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            manifest_dir: PathBuf::from("services"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog agent HTTP API.
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8500".to_string(),
            token: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Sync resources that carry no `catsync.dev/sync` annotation.
    pub sync_by_default: bool,
    /// Namespaces eligible for sync; `*` allows all.
    pub allow_namespaces: Vec<String>,
    /// Namespaces never synced. Takes precedence over `allow_namespaces`.
    pub deny_namespaces: Vec<String>,
    /// Tags appended to every registration.
    pub default_tags: Vec<String>,
    /// Register `web` in namespace `prod` as `web-prod`.
    pub add_namespace_suffix: bool,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            sync_by_default: true,
            allow_namespaces: vec!["*".to_string()],
            deny_namespaces: vec!["kube-system".to_string()],
            default_tags: Vec::new(),
            add_namespace_suffix: false,
        }
    }
}

impl MapperConfig {
    pub fn namespace_allowed(&self, namespace: &str) -> bool {
        if self.deny_namespaces.iter().any(|ns| ns == namespace) {
            return false;
        }
        self.allow_namespaces
            .iter()
            .any(|ns| ns == "*" || ns == namespace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    pub workers: usize,
    /// Retries after a key's first failed attempt; once spent the key is
    /// dropped. `0` drops a key on its first failure.
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub base_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    /// Period of the full re-list that repairs missed watch events.
    #[serde(with = "humantime_serde")]
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            max_retries: 5,
            base_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            resync_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncerConfig {
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub debounce: Duration,
    /// Attempts per catalog write within one pass.
    pub write_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub initial_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for SyncerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            debounce: Duration::from_millis(500),
            write_attempts: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl SyncConfig {
    /// Load config from a YAML file.
    ///
    /// Returns `ConfigError::NotFound` if absent, `ConfigError::Parse` (with
    /// path + line context) if malformed YAML. The result is not validated.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.direction != SyncDirection::ToCatalog {
            return Err(ConfigError::UnsupportedDirection(self.direction));
        }
        if self.owner.is_empty()
            || !self
                .owner
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ConfigError::Invalid(format!(
                "owner '{}' must be non-empty and contain only alphanumerics, '-' or '_'",
                self.owner
            )));
        }
        if self.controller.workers == 0 {
            return Err(ConfigError::Invalid(
                "controller.workers must be at least 1".to_string(),
            ));
        }
        if self.controller.resync_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "controller.resync_interval must be greater than zero".to_string(),
            ));
        }
        if self.syncer.write_attempts == 0 {
            return Err(ConfigError::Invalid(
                "syncer.write_attempts must be at least 1".to_string(),
            ));
        }
        if self.syncer.poll_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "syncer.poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.catalog.address.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "catalog.address must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SyncConfig::default().validate().expect("defaults are valid");
    }

    #[test]
    fn deny_takes_precedence_over_allow() {
        let mapper = MapperConfig {
            allow_namespaces: vec!["*".to_string()],
            deny_namespaces: vec!["kube-system".to_string()],
            ..MapperConfig::default()
        };
        assert!(mapper.namespace_allowed("default"));
        assert!(!mapper.namespace_allowed("kube-system"));
    }

    #[test]
    fn explicit_allow_list() {
        let mapper = MapperConfig {
            allow_namespaces: vec!["prod".to_string()],
            deny_namespaces: vec![],
            ..MapperConfig::default()
        };
        assert!(mapper.namespace_allowed("prod"));
        assert!(!mapper.namespace_allowed("staging"));
    }

    #[test]
    fn direction_display_matches_serde() {
        let yaml = serde_yaml::to_string(&SyncDirection::ToCluster).expect("serialize direction");
        assert_eq!(yaml.trim(), SyncDirection::ToCluster.to_string());
    }
}
