use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use bazaar_utils::{
    path::{resolve_path, xdg_cache_home, xdg_config_home, xdg_data_home},
    time::parse_duration,
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{ConfigError, Result};

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.bazaar.dev";
pub const DEFAULT_TIMEOUT: &str = "30s";
pub const DEFAULT_INDEX_TTL: &str = "1h";
pub const DEFAULT_PACKAGE_TTL: &str = "24h";
pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 10;
pub const DEFAULT_POPULARITY_WEIGHT: f64 = 0.3;
pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.2;
pub const DEFAULT_SIMILARITY_WEIGHT: f64 = 0.5;

/// Application's configuration
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Directory packages are extracted into, as `{install_path}/{id}/{version}`.
    /// Default: $XDG_DATA_HOME/bazaar/packages
    pub install_path: Option<String>,

    /// Serve every query from the local cache and never touch the network.
    /// Default: false
    pub offline: Option<bool>,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub recommend: RecommendConfig,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Base URL of the registry; requests go to `{url}/v1/...`.
    pub url: Option<String>,

    /// Per-request timeout, e.g. `30s`.
    pub timeout: Option<String>,

    /// Value of the `User-Agent` header.
    /// Default: bazaar/<version>
    pub user_agent: Option<String>,

    /// Bearer token sent as `Authorization: Bearer <token>`.
    pub token: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Root of the local cache tree.
    /// Default: $XDG_CACHE_HOME/bazaar
    pub path: Option<String>,

    /// How long a cached index stays fresh.
    /// Default: 1h
    pub index_ttl: Option<String>,

    /// How long a cached package archive stays fresh.
    /// Default: 24h
    pub package_ttl: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct RecommendConfig {
    pub popularity_weight: Option<f64>,
    pub recency_weight: Option<f64>,
    pub similarity_weight: Option<f64>,

    /// Upper bound on the number of recommendations returned by every mode.
    /// Default: 10
    pub max_recommendations: Option<usize>,

    /// Keep already-installed packages in user recommendations.
    /// Default: false
    pub include_installed: Option<bool>,
}

/// Fully resolved recommender settings.
#[derive(Clone, Debug, PartialEq)]
pub struct RecommendSettings {
    pub popularity_weight: f64,
    pub recency_weight: f64,
    pub similarity_weight: f64,
    pub max_recommendations: usize,
    pub include_installed: bool,
}

impl Default for RecommendSettings {
    fn default() -> Self {
        Self {
            popularity_weight: DEFAULT_POPULARITY_WEIGHT,
            recency_weight: DEFAULT_RECENCY_WEIGHT,
            similarity_weight: DEFAULT_SIMILARITY_WEIGHT,
            max_recommendations: DEFAULT_MAX_RECOMMENDATIONS,
            include_installed: false,
        }
    }
}

/// Location of the configuration file: `$BAZAAR_CONFIG` or
/// `$XDG_CONFIG_HOME/bazaar/config.toml`.
pub fn config_path() -> PathBuf {
    match std::env::var("BAZAAR_CONFIG") {
        Ok(path_str) if !path_str.is_empty() => PathBuf::from(path_str),
        _ => xdg_config_home().join("bazaar").join("config.toml"),
    }
}

fn default_user_agent() -> String {
    format!("bazaar/{}", env!("CARGO_PKG_VERSION"))
}

fn duration_field(field: &'static str, value: Option<&str>, default: &str) -> Result<Duration> {
    let value = value.unwrap_or(default);
    parse_duration(value).ok_or_else(|| {
        ConfigError::InvalidDuration {
            field,
            value: value.to_string(),
        }
    })
}

impl Config {
    /// Configuration with every field filled in from the defaults.
    pub fn default_config() -> Self {
        Self {
            install_path: Some(format!("{}/bazaar/packages", xdg_data_home().display())),
            offline: Some(false),
            registry: RegistryConfig {
                url: Some(DEFAULT_REGISTRY_URL.to_string()),
                timeout: Some(DEFAULT_TIMEOUT.to_string()),
                user_agent: Some(default_user_agent()),
                token: None,
            },
            cache: CacheConfig {
                path: Some(format!("{}/bazaar", xdg_cache_home().display())),
                index_ttl: Some(DEFAULT_INDEX_TTL.to_string()),
                package_ttl: Some(DEFAULT_PACKAGE_TTL.to_string()),
            },
            recommend: RecommendConfig {
                popularity_weight: Some(DEFAULT_POPULARITY_WEIGHT),
                recency_weight: Some(DEFAULT_RECENCY_WEIGHT),
                similarity_weight: Some(DEFAULT_SIMILARITY_WEIGHT),
                max_recommendations: Some(DEFAULT_MAX_RECOMMENDATIONS),
                include_installed: Some(false),
            },
        }
    }

    /// Loads the configuration from [`config_path`].
    ///
    /// A missing file yields the default configuration. The result is validated.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path())
    }

    /// Loads and validates the configuration stored at `path`.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(content) => {
                debug!(path = %path.display(), "loading configuration");
                Self::from_toml(&content)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Self::default_config()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document. Unset fields keep their defaults when resolved.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Checks every field that can be resolved without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        self.registry_url()?;

        if self.timeout()?.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "registry.timeout",
                reason: "timeout must be greater than zero".to_string(),
            });
        }
        self.index_ttl()?;
        self.package_ttl()?;

        let settings = self.recommend_settings();
        for (field, weight) in [
            ("recommend.popularity_weight", settings.popularity_weight),
            ("recommend.recency_weight", settings.recency_weight),
            ("recommend.similarity_weight", settings.similarity_weight),
        ] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: format!("weight must be a non-negative number, got {weight}"),
                });
            }
        }

        Ok(())
    }

    /// The registry base URL without a trailing slash.
    pub fn registry_url(&self) -> Result<String> {
        let raw = self
            .registry
            .url
            .as_deref()
            .unwrap_or(DEFAULT_REGISTRY_URL);
        let parsed =
            Url::parse(raw).map_err(|err| ConfigError::InvalidRegistryUrl(format!("{raw}: {err}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidRegistryUrl(raw.to_string()));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    pub fn timeout(&self) -> Result<Duration> {
        duration_field(
            "registry.timeout",
            self.registry.timeout.as_deref(),
            DEFAULT_TIMEOUT,
        )
    }

    pub fn user_agent(&self) -> String {
        self.registry
            .user_agent
            .clone()
            .filter(|ua| !ua.is_empty())
            .unwrap_or_else(default_user_agent)
    }

    /// Bearer token; `BAZAAR_TOKEN` takes precedence over the file.
    pub fn token(&self) -> Option<String> {
        std::env::var("BAZAAR_TOKEN")
            .ok()
            .or_else(|| self.registry.token.clone())
            .filter(|token| !token.is_empty())
    }

    /// Offline flag; `BAZAAR_OFFLINE=1|true` takes precedence over the file.
    pub fn is_offline(&self) -> bool {
        if let Ok(value) = std::env::var("BAZAAR_OFFLINE") {
            return matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self.offline.unwrap_or(false)
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("BAZAAR_CACHE") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(cache_path) = &self.cache.path {
            return Ok(resolve_path(cache_path)?);
        }
        Ok(xdg_cache_home().join("bazaar"))
    }

    pub fn get_install_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("BAZAAR_PACKAGES") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(install_path) = &self.install_path {
            return Ok(resolve_path(install_path)?);
        }
        Ok(xdg_data_home().join("bazaar").join("packages"))
    }

    pub fn index_ttl(&self) -> Result<Duration> {
        duration_field(
            "cache.index_ttl",
            self.cache.index_ttl.as_deref(),
            DEFAULT_INDEX_TTL,
        )
    }

    pub fn package_ttl(&self) -> Result<Duration> {
        duration_field(
            "cache.package_ttl",
            self.cache.package_ttl.as_deref(),
            DEFAULT_PACKAGE_TTL,
        )
    }

    pub fn recommend_settings(&self) -> RecommendSettings {
        let defaults = RecommendSettings::default();
        let recommend = &self.recommend;
        RecommendSettings {
            popularity_weight: recommend
                .popularity_weight
                .unwrap_or(defaults.popularity_weight),
            recency_weight: recommend.recency_weight.unwrap_or(defaults.recency_weight),
            similarity_weight: recommend
                .similarity_weight
                .unwrap_or(defaults.similarity_weight),
            max_recommendations: recommend
                .max_recommendations
                .unwrap_or(defaults.max_recommendations),
            include_installed: recommend
                .include_installed
                .unwrap_or(defaults.include_installed),
        }
    }
}
