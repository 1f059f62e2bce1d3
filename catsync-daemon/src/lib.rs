//! Long-running catsync engine: manifest watcher, controller and syncer.

pub mod controller;
mod error;
pub mod queue;
mod runtime;
pub mod source;

pub use controller::{Controller, EventKind, ResourceEvent};
pub use error::DaemonError;
pub use queue::WorkQueue;
pub use runtime::{init_tracing, run, run_with, start_blocking};
pub use source::{key_for_path, watch_manifests, ManifestSource};
