//! Local cache for the bazaar registry client.
//!
//! Stores the registry index, downloaded package archives and the installed-package
//! manifest, each write accompanied by a [`CacheMeta`] sidecar with a SHA-256 checksum.

pub mod cache;
pub mod error;
pub mod meta;

pub use cache::{Cache, DEFAULT_INDEX_TTL, DEFAULT_PACKAGE_TTL};
pub use error::{CacheError, ErrorContext, Result};
pub use meta::CacheMeta;
