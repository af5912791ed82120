//! Error types for bazaar-core.

use bazaar_cache::CacheError;
use bazaar_config::ConfigError;
use bazaar_registry::RegistryError;
use bazaar_utils::error::{FileSystemError, LockError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

/// Top-level error for marketplace operations.
#[derive(Error, Diagnostic, Debug)]
pub enum BazaarError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(code(bazaar::utils))]
    Utils(#[from] UtilsError),

    #[error("Version {version} of '{id}' not found")]
    #[diagnostic(
        code(bazaar::version_not_found),
        help("Use `latest` or one of the versions listed in the index")
    )]
    VersionNotFound { id: String, version: String },

    #[error("Package '{0}' is not installed")]
    #[diagnostic(code(bazaar::not_installed))]
    NotInstalled(String),

    #[error("Package '{id}' version {version} is already installed")]
    #[diagnostic(
        code(bazaar::already_installed),
        help("Uninstall it first or install a different version")
    )]
    AlreadyInstalled { id: String, version: String },

    #[error("Installation failed: {0}")]
    #[diagnostic(code(bazaar::install_failed))]
    InstallFailed(String),

    #[error("Archive entry escapes the install directory: {0}")]
    #[diagnostic(
        code(bazaar::unsafe_archive_path),
        help("The package archive is malformed or malicious; report it to the registry")
    )]
    UnsafeArchivePath(String),

    #[error("Offline mode: {0}")]
    #[diagnostic(
        code(bazaar::offline),
        help("Disable offline mode or refresh the index while online")
    )]
    Offline(String),

    #[error("Error while {action}")]
    #[diagnostic(code(bazaar::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<FileSystemError> for BazaarError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

impl From<LockError> for BazaarError {
    fn from(err: LockError) -> Self {
        Self::Utils(UtilsError::Lock(err))
    }
}

/// How a caller should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient; the same call may succeed later.
    Retry,
    /// The request itself is wrong or refers to something absent.
    Input,
    /// Stored or downloaded content failed verification; fetch it again.
    Corrupted,
    Internal,
}

fn registry_category(err: &RegistryError) -> ErrorCategory {
    match err {
        RegistryError::Network { .. }
        | RegistryError::RateLimited { .. }
        | RegistryError::ServerError { .. }
        | RegistryError::FetchFailed { .. }
        | RegistryError::Unhealthy(_) => ErrorCategory::Retry,
        RegistryError::ChecksumMismatch { .. } => ErrorCategory::Corrupted,
        RegistryError::JsonError(_) => ErrorCategory::Internal,
        RegistryError::InvalidPackage(_)
        | RegistryError::InvalidPackageType(_)
        | RegistryError::InvalidChecksum { .. }
        | RegistryError::DuplicatePackage(_)
        | RegistryError::PackageNotFound(_)
        | RegistryError::Unauthorized { .. }
        | RegistryError::InvalidUrl(_) => ErrorCategory::Input,
    }
}

impl BazaarError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Registry(err) => registry_category(err),
            Self::Cache(err) => {
                match err {
                    CacheError::Registry(err) => registry_category(err),
                    CacheError::ChecksumMismatch { .. } => ErrorCategory::Corrupted,
                    CacheError::CacheMiss(_)
                    | CacheError::CacheExpired(_)
                    | CacheError::InvalidVersion(_) => ErrorCategory::Input,
                    CacheError::IoError { .. } | CacheError::Json(_) | CacheError::Utils(_) => {
                        ErrorCategory::Internal
                    }
                }
            }
            Self::Config(_) => ErrorCategory::Input,
            Self::VersionNotFound { .. }
            | Self::NotInstalled(_)
            | Self::AlreadyInstalled { .. }
            | Self::InstallFailed(_)
            | Self::UnsafeArchivePath(_)
            | Self::Offline(_) => ErrorCategory::Input,
            Self::Utils(_) | Self::IoError { .. } => ErrorCategory::Internal,
        }
    }
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, BazaarError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, BazaarError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            BazaarError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}
