//! Error types for the cache crate.

use bazaar_registry::RegistryError;
use bazaar_utils::error::{FileSystemError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    #[error("Cache miss: {0}")]
    #[diagnostic(code(bazaar_cache::miss))]
    CacheMiss(String),

    #[error("Cache entry expired: {0}")]
    #[diagnostic(
        code(bazaar_cache::expired),
        help("Refresh the index to repopulate the cache")
    )]
    CacheExpired(String),

    #[error("Cached {key} is corrupted: expected checksum {expected}, got {actual}")]
    #[diagnostic(
        code(bazaar_cache::checksum_mismatch),
        help("Clear the cache to force a fresh download")
    )]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid version string for cache key: {0:?}")]
    #[diagnostic(code(bazaar_cache::invalid_version))]
    InvalidVersion(String),

    #[error("Error while {action}")]
    #[diagnostic(code(bazaar_cache::io))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache document: {0}")]
    #[diagnostic(
        code(bazaar_cache::json),
        help("The cache file may be corrupted; clear the cache and try again")
    )]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(code(bazaar_cache::utils))]
    Utils(#[from] UtilsError),
}

impl From<FileSystemError> for CacheError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

impl CacheError {
    /// Whether the entry is simply absent or stale, as opposed to unreadable.
    pub fn is_miss(&self) -> bool {
        matches!(self, Self::CacheMiss(_) | Self::CacheExpired(_))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            CacheError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
