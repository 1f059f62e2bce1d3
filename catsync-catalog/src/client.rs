//! The catalog client capability used by the syncer.

use async_trait::async_trait;

use catsync_core::CatalogRegistration;

use crate::error::CatalogError;

/// Restricts [`CatalogClient::list`] results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    /// Only entries whose ownership marker equals this value.
    pub owner: Option<String>,
}

impl ListFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn owned_by(owner: impl Into<String>) -> Self {
        Self {
            owner: Some(owner.into()),
        }
    }

    pub fn matches(&self, entry: &CatalogRegistration) -> bool {
        match &self.owner {
            Some(owner) => entry.is_owned_by(owner),
            None => true,
        }
    }
}

/// Register / deregister / list against the external catalog.
///
/// Implementations own no retry logic; every call may fail with a transient
/// or permanent [`CatalogError`].
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Create or overwrite the entry with `registration.id`.
    async fn register(&self, registration: &CatalogRegistration) -> Result<(), CatalogError>;

    /// Remove the entry with `id`. Removing an absent entry succeeds.
    async fn deregister(&self, id: &str) -> Result<(), CatalogError>;

    /// List entries, sorted by id.
    async fn list(&self, filter: &ListFilter) -> Result<Vec<CatalogRegistration>, CatalogError>;
}
