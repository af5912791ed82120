//! Registry access for the bazaar package marketplace.
//!
//! This crate holds the package data model, the in-memory registry [`Index`] and the
//! blocking HTTP [`RegistryClient`].
//!
//! # Example
//!
//! ```no_run
//! use bazaar_registry::{ClientConfig, RegistryClient};
//!
//! fn newest(registry: &str) -> bazaar_registry::Result<()> {
//!     let client = RegistryClient::new(registry, ClientConfig::default())?;
//!     let index = client.fetch_index()?;
//!     for pkg in index.list_by_recent().into_iter().take(5) {
//!         println!("{} ({})", pkg.id, pkg.package_type);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod error;
pub mod http_client;
pub mod index;
pub mod package;

pub use client::{RegistryClient, SearchOptions};
pub use error::{RegistryError, Result};
pub use http_client::{ClientConfig, DEFAULT_USER_AGENT};
pub use index::{Index, IndexStats, INDEX_FORMAT};
pub use package::{
    InstalledPackage, Package, PackageId, PackageType, PackageVersion, Provenance, LATEST,
};
