//! # catsync-catalog
//!
//! The boundary to the external service catalog.
//!
//! [`CatalogClient`] is the only surface the sync engine writes through.
//! [`HttpCatalog`] speaks the catalog agent's JSON HTTP API;
//! [`MemoryCatalog`] keeps entries in memory and can inject failures.

pub mod client;
pub mod error;
pub mod http;
pub mod memory;

pub use client::{CatalogClient, ListFilter};
pub use error::CatalogError;
pub use http::HttpCatalog;
pub use memory::{CatalogCall, MemoryCatalog};
