//! # catsync-sync
//!
//! The synchronization engine.
//!
//! A [`ServiceMapper`] turns cluster services into desired catalog
//! registrations held in a [`DesiredStore`]; a [`Syncer`] diffs that store
//! against the catalog and converges it, one idempotent call per entry.

pub mod error;
pub mod mapper;
pub mod plan;
pub mod registration;
pub mod retry;
pub mod signal;
pub mod source;
pub mod store;
pub mod syncer;

pub use error::{MapperError, SourceError, SyncError};
pub use mapper::{Resource, ServiceMapper};
pub use plan::{compute_plan, ReconcilePlan};
pub use registration::{build_registration, registration_id, MappingSkip};
pub use retry::RetryPolicy;
pub use signal::{change_channel, ChangeReceiver, ChangeSignal};
pub use source::{MemorySource, ServiceSource};
pub use store::DesiredStore;
pub use syncer::{PassStatus, PassSummary, Syncer, SyncerHandle};
