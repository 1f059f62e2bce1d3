//! Per-service sync policy, parsed from resource annotations.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::MalformedResource;

/// Annotation keys read from watched resources.
pub mod annotations {
    /// `"true"` / `"false"`; absent means the configured default.
    pub const SYNC: &str = "catsync.dev/sync";
    /// Replaces the catalog service name.
    pub const SERVICE_NAME: &str = "catsync.dev/service-name";
    /// Comma-separated list replacing the resource's own tags.
    pub const SERVICE_TAGS: &str = "catsync.dev/service-tags";
    /// Port to register, by port name or number.
    pub const SERVICE_PORT: &str = "catsync.dev/service-port";
    /// Prefix for extra catalog metadata: `catsync.dev/service-meta-<key>`.
    pub const SERVICE_META_PREFIX: &str = "catsync.dev/service-meta-";
}

/// Catalog metadata keys written on every registration.
pub mod meta {
    /// Ownership marker. Only entries carrying this key with our owner value
    /// are ever deregistered.
    pub const OWNER: &str = "catsync-owner";
    pub const NAMESPACE: &str = "catsync-namespace";
    pub const NAME: &str = "catsync-name";
}

/// Which port of a multi-port service to register.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSelector {
    Name(String),
    Number(u16),
}

impl fmt::Display for PortSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSelector::Name(name) => name.fmt(f),
            PortSelector::Number(port) => port.fmt(f),
        }
    }
}

impl PortSelector {
    fn parse(value: &str) -> Self {
        match value.parse::<u16>() {
            Ok(port) => PortSelector::Number(port),
            Err(_) => PortSelector::Name(value.to_string()),
        }
    }
}

/// Sync policy flags carried by a cluster resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPolicy {
    pub sync: Option<bool>,
    pub name_override: Option<String>,
    pub tags_override: Option<Vec<String>>,
    pub port: Option<PortSelector>,
    /// Extra metadata from `service-meta-*` annotations.
    pub meta: BTreeMap<String, String>,
}

impl SyncPolicy {
    /// Parse policy annotations. Unknown annotations are ignored.
    pub fn from_annotations(
        annotations: &BTreeMap<String, String>,
    ) -> Result<Self, MalformedResource> {
        let mut policy = SyncPolicy::default();

        if let Some(value) = annotations.get(annotations::SYNC) {
            policy.sync = Some(parse_bool(annotations::SYNC, value)?);
        }

        if let Some(value) = annotations.get(annotations::SERVICE_NAME) {
            let value = value.trim();
            if value.is_empty() {
                return Err(invalid(annotations::SERVICE_NAME, value));
            }
            policy.name_override = Some(value.to_string());
        }

        if let Some(value) = annotations.get(annotations::SERVICE_TAGS) {
            policy.tags_override = Some(split_list(value));
        }

        if let Some(value) = annotations.get(annotations::SERVICE_PORT) {
            let value = value.trim();
            if value.is_empty() {
                return Err(invalid(annotations::SERVICE_PORT, value));
            }
            policy.port = Some(PortSelector::parse(value));
        }

        for (key, value) in annotations {
            if let Some(meta_key) = key.strip_prefix(annotations::SERVICE_META_PREFIX) {
                if meta_key.is_empty() || meta_key.starts_with("catsync-") {
                    return Err(invalid(key, value));
                }
                policy.meta.insert(meta_key.to_string(), value.clone());
            }
        }

        Ok(policy)
    }

    /// Whether the resource should be synced, given the configured default.
    pub fn is_enabled(&self, sync_by_default: bool) -> bool {
        self.sync.unwrap_or(sync_by_default)
    }
}

fn parse_bool(annotation: &str, value: &str) -> Result<bool, MalformedResource> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(annotation, value)),
    }
}

/// Split a comma-separated annotation into trimmed, non-empty entries.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

fn invalid(annotation: &str, value: &str) -> MalformedResource {
    MalformedResource::InvalidAnnotation {
        annotation: annotation.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn empty_annotations_yield_default_policy() {
        let policy = SyncPolicy::from_annotations(&BTreeMap::new()).expect("policy");
        assert_eq!(policy, SyncPolicy::default());
        assert!(policy.is_enabled(true));
        assert!(!policy.is_enabled(false));
    }

    #[test]
    fn sync_flag_overrides_default() {
        let off = SyncPolicy::from_annotations(&annotated(&[(annotations::SYNC, "false")])).expect("policy");
        assert!(!off.is_enabled(true));

        let on = SyncPolicy::from_annotations(&annotated(&[(annotations::SYNC, "TRUE")])).expect("policy");
        assert!(on.is_enabled(false));
    }

    #[test]
    fn unparsable_sync_flag_is_malformed() {
        let err = SyncPolicy::from_annotations(&annotated(&[(annotations::SYNC, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, MalformedResource::InvalidAnnotation { .. }));
        assert!(err.to_string().contains("catsync.dev/sync"));
    }

    #[test]
    fn tags_override_is_trimmed_and_filtered() {
        let policy = SyncPolicy::from_annotations(&annotated(&[(
            annotations::SERVICE_TAGS,
            " blue , ,green,",
        )]))
        .expect("policy");
        assert_eq!(
            policy.tags_override,
            Some(vec!["blue".to_string(), "green".to_string()])
        );
    }

    #[test]
    fn empty_tags_override_clears_tags() {
        let policy =
            SyncPolicy::from_annotations(&annotated(&[(annotations::SERVICE_TAGS, "")])).expect("policy");
        assert_eq!(policy.tags_override, Some(vec![]));
    }

    #[test]
    fn port_selector_by_number_and_name() {
        let by_number =
            SyncPolicy::from_annotations(&annotated(&[(annotations::SERVICE_PORT, "9090")]))
                .expect("policy");
        assert_eq!(by_number.port, Some(PortSelector::Number(9090)));

        let by_name =
            SyncPolicy::from_annotations(&annotated(&[(annotations::SERVICE_PORT, "grpc")]))
                .expect("policy");
        assert_eq!(by_name.port, Some(PortSelector::Name("grpc".to_string())));
    }

    #[test]
    fn meta_annotations_are_collected() {
        let policy = SyncPolicy::from_annotations(&annotated(&[
            ("catsync.dev/service-meta-team", "payments"),
            ("unrelated/annotation", "x"),
        ]))
        .expect("policy");
        assert_eq!(policy.meta.get("team"), Some(&"payments".to_string()));
        assert_eq!(policy.meta.len(), 1);
    }

    #[test]
    fn meta_annotation_cannot_shadow_ownership_keys() {
        let err = SyncPolicy::from_annotations(&annotated(&[(
            "catsync.dev/service-meta-catsync-owner",
            "someone-else",
        )]))
        .unwrap_err();
        assert!(matches!(err, MalformedResource::InvalidAnnotation { .. }));
    }
}
