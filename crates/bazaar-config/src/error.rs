use bazaar_utils::error::{FileSystemError, PathError, UtilsError};
use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(bazaar_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(bazaar_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Invalid duration for `{field}`: {value}")]
    #[diagnostic(
        code(bazaar_config::invalid_duration),
        help("Use a duration like `30s`, `15m`, `1h` or `1d`")
    )]
    InvalidDuration { field: &'static str, value: String },

    #[error("Invalid registry URL: {0}")]
    #[diagnostic(
        code(bazaar_config::invalid_registry_url),
        help("The registry URL must be an absolute http:// or https:// URL")
    )]
    InvalidRegistryUrl(String),

    #[error("Invalid value for `{field}`: {reason}")]
    #[diagnostic(code(bazaar_config::invalid_value))]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(bazaar_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(bazaar_config::utils))]
    Utils(#[from] UtilsError),
}

impl From<PathError> for ConfigError {
    fn from(err: PathError) -> Self {
        Self::Utils(UtilsError::Path(err))
    }
}

impl From<FileSystemError> for ConfigError {
    fn from(err: FileSystemError) -> Self {
        Self::Utils(UtilsError::FileSystem(err))
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
