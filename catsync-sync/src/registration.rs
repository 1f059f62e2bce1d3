//! Cluster service → catalog registration.
//!
//! Pure functions; the mapper decides what to do with a [`MappingSkip`].

use sha2::{Digest, Sha256};
use thiserror::Error;

use catsync_core::{
    policy::meta, CatalogRegistration, ClusterService, MapperConfig, PortSelector, ServiceKey,
};

/// Why a cluster service produces no registration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingSkip {
    #[error("sync disabled by policy")]
    Disabled,

    #[error("namespace '{0}' is not synced")]
    NamespaceFiltered(String),

    #[error("service exposes no ports")]
    NoPorts,

    #[error("service-port annotation '{0}' matches no port")]
    PortNotFound(PortSelector),

    #[error("service has no address")]
    NoAddress,
}

impl MappingSkip {
    /// Skips caused by bad input rather than deliberate policy.
    pub fn is_malformed(&self) -> bool {
        matches!(self, MappingSkip::PortNotFound(_))
    }
}

/// Deterministic catalog id for `key` as written by `owner`.
///
/// `<name>-<16 hex chars of sha256(owner \0 namespace \0 name)>`: stable
/// across restarts, so repeated registrations overwrite instead of
/// duplicating.
pub fn registration_id(owner: &str, key: &ServiceKey) -> String {
    let digest = {
        let mut h = Sha256::new();
        h.update(owner.as_bytes());
        h.update([0u8]);
        h.update(key.namespace.as_bytes());
        h.update([0u8]);
        h.update(key.name.as_bytes());
        hex::encode(h.finalize())
    };
    format!("{}-{}", key.name, &digest[..16])
}

/// Compute the registration for `service`, or the reason there is none.
pub fn build_registration(
    service: &ClusterService,
    owner: &str,
    config: &MapperConfig,
) -> Result<CatalogRegistration, MappingSkip> {
    let key = &service.key;
    if !config.namespace_allowed(&key.namespace) {
        return Err(MappingSkip::NamespaceFiltered(key.namespace.clone()));
    }
    if !service.policy.is_enabled(config.sync_by_default) {
        return Err(MappingSkip::Disabled);
    }

    let port = select_port(service)?;
    let address = service
        .addresses
        .iter()
        .map(|a| a.trim())
        .find(|a| !a.is_empty())
        .ok_or(MappingSkip::NoAddress)?
        .to_string();

    let name = match &service.policy.name_override {
        Some(name) => name.clone(),
        None if config.add_namespace_suffix => format!("{}-{}", key.name, key.namespace),
        None => key.name.clone(),
    };

    let base_tags = service
        .policy
        .tags_override
        .as_ref()
        .unwrap_or(&service.tags);
    let mut tags: Vec<String> = Vec::with_capacity(base_tags.len() + config.default_tags.len());
    for tag in base_tags.iter().chain(config.default_tags.iter()) {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    let mut registration_meta = service.policy.meta.clone();
    registration_meta.insert(meta::OWNER.to_string(), owner.to_string());
    registration_meta.insert(meta::NAMESPACE.to_string(), key.namespace.clone());
    registration_meta.insert(meta::NAME.to_string(), key.name.clone());

    Ok(CatalogRegistration {
        id: registration_id(owner, key),
        name,
        address,
        port,
        tags,
        meta: registration_meta,
    })
}

fn select_port(service: &ClusterService) -> Result<u16, MappingSkip> {
    match &service.policy.port {
        // An explicit number wins even when the service does not declare it.
        Some(PortSelector::Number(port)) => Ok(*port),
        Some(selector @ PortSelector::Name(name)) => service
            .ports
            .iter()
            .find(|p| p.name.as_deref() == Some(name.as_str()))
            .map(|p| p.port)
            .ok_or_else(|| MappingSkip::PortNotFound(selector.clone())),
        None => service
            .ports
            .first()
            .map(|p| p.port)
            .ok_or(MappingSkip::NoPorts),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use catsync_core::{ServicePort, SyncPolicy};
    use rstest::rstest;

    use super::*;

    fn service(ns: &str, name: &str) -> ClusterService {
        ClusterService {
            key: ServiceKey::new(ns, name).expect("key"),
            addresses: vec!["10.0.0.5".to_string()],
            ports: vec![
                ServicePort {
                    name: Some("http".to_string()),
                    port: 8080,
                },
                ServicePort {
                    name: Some("grpc".to_string()),
                    port: 9090,
                },
            ],
            tags: vec!["web".to_string()],
            labels: BTreeMap::new(),
            policy: SyncPolicy::default(),
        }
    }

    fn config() -> MapperConfig {
        MapperConfig {
            default_tags: vec![],
            ..MapperConfig::default()
        }
    }

    #[test]
    fn id_is_deterministic_and_key_scoped() {
        let web = ServiceKey::new("default", "web").expect("key");
        let other_ns = ServiceKey::new("prod", "web").expect("key");
        assert_eq!(registration_id("catsync", &web), registration_id("catsync", &web));
        assert_ne!(registration_id("catsync", &web), registration_id("catsync", &other_ns));
        assert_ne!(registration_id("catsync", &web), registration_id("east", &web));
        let id = registration_id("catsync", &web);
        assert!(id.starts_with("web-"));
        assert_eq!(id.len(), "web-".len() + 16);
    }

    #[test]
    fn basic_registration_carries_ownership_marker() {
        let reg = build_registration(&service("default", "web"), "catsync", &config())
            .expect("registration");
        assert_eq!(reg.name, "web");
        assert_eq!(reg.address, "10.0.0.5");
        assert_eq!(reg.port, 8080);
        assert_eq!(reg.tags, vec!["web".to_string()]);
        assert!(reg.is_owned_by("catsync"));
        assert_eq!(
            reg.service_key(),
            Some(ServiceKey::new("default", "web").expect("key"))
        );
    }

    #[test]
    fn overrides_are_applied() {
        let mut svc = service("default", "web");
        svc.policy.name_override = Some("frontend".to_string());
        svc.policy.tags_override = Some(vec!["blue".to_string()]);
        svc.policy.port = Some(PortSelector::Name("grpc".to_string()));
        svc.policy.meta.insert("team".to_string(), "payments".to_string());
        let config = MapperConfig {
            default_tags: vec!["k8s".to_string(), "blue".to_string()],
            add_namespace_suffix: true,
            ..MapperConfig::default()
        };

        let reg = build_registration(&svc, "catsync", &config).expect("registration");
        assert_eq!(reg.name, "frontend", "override suppresses namespace suffix");
        assert_eq!(reg.port, 9090);
        assert_eq!(reg.tags, vec!["blue".to_string(), "k8s".to_string()]);
        assert_eq!(reg.meta.get("team"), Some(&"payments".to_string()));
        assert_eq!(reg.id, registration_id("catsync", &svc.key), "id ignores name override");
    }

    #[test]
    fn namespace_suffix_without_override() {
        let config = MapperConfig {
            add_namespace_suffix: true,
            ..config()
        };
        let reg = build_registration(&service("prod", "web"), "catsync", &config)
            .expect("registration");
        assert_eq!(reg.name, "web-prod");
    }

    #[test]
    fn numeric_port_annotation_is_used_verbatim() {
        let mut svc = service("default", "web");
        svc.policy.port = Some(PortSelector::Number(7000));
        let reg = build_registration(&svc, "catsync", &config()).expect("registration");
        assert_eq!(reg.port, 7000);
    }

    #[rstest]
    #[case::disabled(
        |s: &mut ClusterService| s.policy.sync = Some(false),
        MappingSkip::Disabled
    )]
    #[case::denied_namespace(
        |s: &mut ClusterService| s.key = ServiceKey::new("kube-system", "dns").expect("key"),
        MappingSkip::NamespaceFiltered("kube-system".to_string())
    )]
    #[case::no_ports(|s: &mut ClusterService| s.ports.clear(), MappingSkip::NoPorts)]
    #[case::blank_address(
        |s: &mut ClusterService| s.addresses = vec!["  ".to_string()],
        MappingSkip::NoAddress
    )]
    #[case::unknown_port_name(
        |s: &mut ClusterService| s.policy.port = Some(PortSelector::Name("admin".to_string())),
        MappingSkip::PortNotFound(PortSelector::Name("admin".to_string()))
    )]
    fn skipped_services(#[case] mutate: fn(&mut ClusterService), #[case] expected: MappingSkip) {
        let mut svc = service("default", "web");
        mutate(&mut svc);
        assert_eq!(
            build_registration(&svc, "catsync", &config()).unwrap_err(),
            expected
        );
    }

    #[test]
    fn opt_in_mode_requires_annotation() {
        let config = MapperConfig {
            sync_by_default: false,
            ..config()
        };
        let mut svc = service("default", "web");
        assert_eq!(
            build_registration(&svc, "catsync", &config).unwrap_err(),
            MappingSkip::Disabled
        );
        svc.policy.sync = Some(true);
        assert!(build_registration(&svc, "catsync", &config).is_ok());
    }
}
