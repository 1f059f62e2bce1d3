//! catsync core library: domain types, sync policy, configuration, errors.
//!
//! Public API surface:
//! - [`types`]: service keys, cluster services, catalog registrations
//! - [`policy`]: annotation-driven per-service sync policy
//! - [`config`]: [`SyncConfig`] load / validate
//! - [`error`]: [`ConfigError`], [`MalformedResource`]

pub mod config;
pub mod error;
pub mod policy;
pub mod types;

pub use config::{
    CatalogConfig, ControllerConfig, MapperConfig, SourceConfig, SyncConfig, SyncDirection,
    SyncerConfig,
};
pub use error::{ConfigError, MalformedResource};
pub use policy::{PortSelector, SyncPolicy};
pub use types::{CatalogRegistration, ClusterService, ServiceKey, ServiceManifest, ServicePort};
