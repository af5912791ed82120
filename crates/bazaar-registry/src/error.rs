//! Error types for the registry crate.
//!
//! [`RegistryError`] covers model validation, index manipulation and every outcome of a
//! registry HTTP exchange, so callers can tell "retry later" apart from "fix input".

use miette::Diagnostic;
use thiserror::Error;

/// Errors that can occur while validating packages or talking to the registry.
#[derive(Error, Diagnostic, Debug)]
pub enum RegistryError {
    #[error("Invalid package: {0}")]
    #[diagnostic(
        code(bazaar_registry::invalid_package),
        help("Package ids use lowercase letters, digits and inner hyphens; packages need a title and at least one version")
    )]
    InvalidPackage(String),

    #[error("Invalid package type: {0}")]
    #[diagnostic(
        code(bazaar_registry::invalid_package_type),
        help("Valid types are `preset`, `capability-pack` and `layer-template`")
    )]
    InvalidPackageType(String),

    #[error("Package version {version} has no checksum")]
    #[diagnostic(
        code(bazaar_registry::invalid_checksum),
        help("The registry entry is incomplete; report it to the package author")
    )]
    InvalidChecksum { version: String },

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(bazaar_registry::checksum_mismatch),
        help("The downloaded archive is corrupted or was tampered with. Clear the cache and try again.")
    )]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Package '{0}' already exists in the index")]
    #[diagnostic(code(bazaar_registry::duplicate_package))]
    DuplicatePackage(String),

    #[error("Package '{0}' not found")]
    #[diagnostic(
        code(bazaar_registry::package_not_found),
        help("Check the package id or refresh the index")
    )]
    PackageNotFound(String),

    #[error("Unauthorized request to {url} [{status}]")]
    #[diagnostic(
        code(bazaar_registry::unauthorized),
        help("Set a valid registry token in the configuration or BAZAAR_TOKEN")
    )]
    Unauthorized { status: u16, url: String },

    #[error("Rate limited by registry: {url}")]
    #[diagnostic(
        code(bazaar_registry::rate_limited),
        help("Wait a moment before retrying")
    )]
    RateLimited { url: String },

    #[error("Registry server error [{status}]: {url}")]
    #[diagnostic(
        code(bazaar_registry::server_error),
        help("The registry is having trouble; try again later")
    )]
    ServerError { status: u16, url: String },

    #[error("Failed to fetch {url} [{status}]")]
    #[diagnostic(code(bazaar_registry::fetch_failed))]
    FetchFailed { status: u16, url: String },

    #[error("Registry is unhealthy [{0}]")]
    #[diagnostic(code(bazaar_registry::unhealthy))]
    Unhealthy(u16),

    #[error("Network error while requesting {url}: {source}")]
    #[diagnostic(
        code(bazaar_registry::network),
        help("Check your network connection and the registry URL")
    )]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Invalid URL: {0}")]
    #[diagnostic(
        code(bazaar_registry::invalid_url),
        help("Ensure the registry URL is valid and properly formatted")
    )]
    InvalidUrl(String),

    #[error(transparent)]
    #[diagnostic(
        code(bazaar_registry::json),
        help("The registry document may be corrupted or in an invalid format")
    )]
    JsonError(#[from] serde_json::Error),
}

impl RegistryError {
    /// Maps an HTTP status code to the matching error; `None` for 200.
    pub fn from_status(status: u16, url: &str, id: Option<&str>) -> Option<Self> {
        let url = url.to_string();
        let err = match status {
            200 => return None,
            404 => Self::PackageNotFound(id.map(String::from).unwrap_or(url)),
            401 | 403 => Self::Unauthorized { status, url },
            429 => Self::RateLimited { url },
            500..=599 => Self::ServerError { status, url },
            _ => Self::FetchFailed { status, url },
        };
        Some(err)
    }

    /// Transport and throttling failures that are worth retrying later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Network { .. } | Self::RateLimited { .. } | Self::ServerError { .. }
        )
    }
}

/// A specialized Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
