//! The marketplace service.
//!
//! [`Service`] ties the local [`Cache`] to the remote [`RegistryClient`]: reads are served
//! from the cache when fresh, fall back to the network when stale, and in offline mode fall
//! back to stale cache entries instead. Mutating operations (install, uninstall, update,
//! refresh, clear) hold an exclusive lock on `<cache_root>.lock` for their whole duration.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use bazaar_cache::Cache;
use bazaar_config::Config;
use bazaar_core::{BazaarError, BazaarResult};
use bazaar_registry::{ClientConfig, Index, Package, RegistryClient, SearchOptions};
use bazaar_utils::lock::FileLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct Service {
    pub(crate) cache: Cache,
    pub(crate) client: RegistryClient,
    pub(crate) install_path: PathBuf,
    pub(crate) offline: bool,
    pub(crate) tool_version: Option<String>,
    lock_path: PathBuf,
}

fn lock_path_for(cache_root: &Path) -> PathBuf {
    let mut name = OsString::from(cache_root.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

impl Service {
    pub fn new<P: Into<PathBuf>>(cache: Cache, client: RegistryClient, install_path: P) -> Self {
        let lock_path = lock_path_for(cache.root());
        Self {
            cache,
            client,
            install_path: install_path.into(),
            offline: false,
            tool_version: None,
            lock_path,
        }
    }

    /// Builds a service from resolved configuration.
    pub fn from_config(config: &Config) -> BazaarResult<Self> {
        let client_config = ClientConfig {
            user_agent: config.user_agent(),
            token: config.token(),
            timeout: Some(config.timeout()?),
        };
        let client = RegistryClient::new(&config.registry_url()?, client_config)?;
        let cache = Cache::new(config.get_cache_path()?)
            .with_ttls(config.index_ttl()?, config.package_ttl()?);

        debug!(
            registry = client.base_url(),
            cache = %cache.root().display(),
            offline = config.is_offline(),
            "initializing service"
        );

        Ok(Self::new(cache, client, config.get_install_path()?).with_offline(config.is_offline()))
    }

    pub fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Version of the host tool, used to flag incompatible updates.
    pub fn with_tool_version<S: Into<String>>(mut self, version: S) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    pub fn cache(&self) -> &Cache {
        &self.cache
    }

    pub fn client(&self) -> &RegistryClient {
        &self.client
    }

    pub fn install_path(&self) -> &Path {
        &self.install_path
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub(crate) fn lock(&self) -> BazaarResult<FileLock> {
        Ok(FileLock::acquire(&self.lock_path)?)
    }

    pub(crate) fn offline_error(what: &str) -> BazaarError {
        BazaarError::Offline(what.to_string())
    }

    /// Returns the registry index, preferring a fresh cache entry.
    ///
    /// On a miss the index is fetched and written back to the cache; a failed write is
    /// logged and otherwise ignored. In offline mode an expired cache entry is used instead
    /// of the network.
    pub(crate) fn get_index(&self) -> BazaarResult<Index> {
        match self.cache.get_index() {
            Ok(index) => return Ok(index),
            Err(err) if err.is_miss() => debug!(reason = %err, "index not usable from cache"),
            Err(err) => return Err(err.into()),
        }

        if self.offline {
            return match self.cache.get_stale_index() {
                Ok(index) => {
                    warn!("offline mode: using expired index from cache");
                    Ok(index)
                }
                Err(err) if err.is_miss() => Err(Self::offline_error("no cached index available")),
                Err(err) => Err(err.into()),
            };
        }

        let index = self.client.fetch_index()?;
        let source = self.client.index_url()?;
        if let Err(err) = self.cache.put_index(&index, source.as_str()) {
            warn!(error = %err, "failed to cache registry index");
        }
        Ok(index)
    }

    /// Fetches the index from the registry and overwrites the cached copy.
    pub fn refresh_index(&self) -> BazaarResult<Index> {
        if self.offline {
            return Err(Self::offline_error("cannot refresh the index"));
        }

        let _lock = self.lock()?;
        let index = self.client.fetch_index()?;
        let source = self.client.index_url()?;
        self.cache.put_index(&index, source.as_str())?;
        info!(packages = index.count(), "refreshed registry index");
        Ok(index)
    }

    /// Checks that the registry is reachable and healthy.
    pub fn ping(&self) -> BazaarResult<()> {
        if self.offline {
            return Err(Self::offline_error("registry is not contacted"));
        }
        Ok(self.client.ping()?)
    }

    /// Searches on the registry side, bypassing the cached index.
    pub fn search_remote(&self, query: &str, opts: &SearchOptions) -> BazaarResult<Vec<Package>> {
        if self.offline {
            return Err(Self::offline_error("remote search is unavailable"));
        }
        Ok(self.client.search(query, opts)?)
    }

    /// Removes the entire cache, installed manifest included.
    pub fn clear_cache(&self) -> BazaarResult<()> {
        let _lock = self.lock()?;
        self.cache.clear()?;
        Ok(())
    }

    /// Drops only the cached index so the next read goes to the registry.
    pub fn clear_index_cache(&self) -> BazaarResult<()> {
        let _lock = self.lock()?;
        self.cache.clear_index()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use bazaar_cache::CacheError;
    use bazaar_registry::RegistryError;
    use httpmock::prelude::*;
    use serial_test::serial;

    use super::*;
    use crate::test_utils::{index_doc, package, TestEnv};

    #[test]
    fn test_lock_path() {
        assert_eq!(
            lock_path_for(Path::new("/var/cache/bazaar")),
            PathBuf::from("/var/cache/bazaar.lock")
        );
    }

    #[test]
    fn test_get_index_fetches_then_caches() {
        let env = TestEnv::new();
        let mock = env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);

        let service = env.service();
        assert_eq!(service.get_index().unwrap().count(), 1);
        assert_eq!(service.get_index().unwrap().count(), 1);

        mock.assert_hits(1);
        let meta = service.cache().index_meta().unwrap().unwrap();
        assert!(meta.source.ends_with("/v1/index.json"));
    }

    #[test]
    fn test_get_index_refetches_after_expiry() {
        let env = TestEnv::new();
        let mock = env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);

        let service = env.service_with_ttl(Duration::from_millis(50));
        service.get_index().unwrap();
        thread::sleep(Duration::from_millis(120));
        service.get_index().unwrap();

        mock.assert_hits(2);
    }

    #[test]
    fn test_get_index_propagates_registry_errors() {
        let env = TestEnv::new();
        env.server.mock(|when, then| {
            when.path("/v1/index.json");
            then.status(500);
        });

        let err = env.service().get_index().unwrap_err();
        assert!(matches!(
            err,
            BazaarError::Registry(RegistryError::ServerError { status: 500, .. })
        ));
    }

    #[test]
    fn test_get_index_cache_write_failure_is_not_fatal() {
        let env = TestEnv::new();
        env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);

        // A directory in place of index.json makes the cache write fail.
        let service = env.service();
        std::fs::create_dir_all(service.cache().index_path()).unwrap();

        assert_eq!(service.get_index().unwrap().count(), 1);
        assert!(service.cache().index_meta().unwrap().is_none());
    }

    #[test]
    fn test_corrupted_cached_index_propagates() {
        let env = TestEnv::new();
        env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
        let service = env.service();
        service.get_index().unwrap();

        std::fs::write(service.cache().index_path(), b"{}").unwrap();
        assert!(matches!(
            service.get_index(),
            Err(BazaarError::Cache(CacheError::ChecksumMismatch { .. }))
        ));
    }

    #[test]
    fn test_offline_without_cache() {
        let env = TestEnv::new();
        let service = env.service().with_offline(true);

        let err = service.get_index().unwrap_err();
        assert!(matches!(err, BazaarError::Offline(_)));
        assert!(err.to_string().to_lowercase().contains("offline mode"));
        assert!(matches!(
            service.refresh_index(),
            Err(BazaarError::Offline(_))
        ));
        assert!(matches!(service.ping(), Err(BazaarError::Offline(_))));
    }

    #[test]
    fn test_refresh_index_overwrites_cache() {
        let env = TestEnv::new();
        let mut first = env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
        let service = env.service();
        service.get_index().unwrap();

        first.delete();
        env.server.mock(|when, then| {
            when.path("/v1/index.json");
            then.status(200).json_body(index_doc(&[
                package("nvim-config", 1000, 50, &["editor"]),
                package("rust-tools", 10, 1, &["rust"]),
            ]));
        });

        assert_eq!(service.get_index().unwrap().count(), 1);
        assert_eq!(service.refresh_index().unwrap().count(), 2);
        assert_eq!(service.get_index().unwrap().count(), 2);
    }

    #[test]
    fn test_clear_index_cache() {
        let env = TestEnv::new();
        let mock = env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
        let service = env.service();

        service.get_index().unwrap();
        service.clear_index_cache().unwrap();
        service.get_index().unwrap();
        mock.assert_hits(2);

        service.clear_cache().unwrap();
        assert!(!service.cache().root().exists());
    }

    #[test]
    fn test_ping_and_search_remote() {
        let env = TestEnv::new();
        env.server.mock(|when, then| {
            when.path("/v1/health");
            then.status(200);
        });
        env.server.mock(|when, then| {
            when.method(GET).path("/v1/search").query_param("q", "nvim");
            then.status(200)
                .json_body(index_doc(&[package("nvim-config", 1000, 50, &["editor"])]));
        });

        let service = env.service();
        service.ping().unwrap();
        let found = service
            .search_remote("nvim", &SearchOptions::default())
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    #[serial]
    fn test_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            r#"
            install_path = "{root}/packages"
            offline = true

            [registry]
            url = "http://127.0.0.1:9/"
            timeout = "5s"

            [cache]
            path = "{root}/cache"
            index_ttl = "10m"
            "#,
            root = dir.path().display()
        );
        let config = Config::from_toml(&toml).unwrap();

        let service = Service::from_config(&config).unwrap();
        assert!(service.is_offline());
        assert_eq!(service.client().base_url(), "http://127.0.0.1:9");
        assert_eq!(service.install_path(), dir.path().join("packages"));
        assert_eq!(service.cache().root(), dir.path().join("cache"));
        assert_eq!(service.cache().index_ttl(), Duration::from_secs(600));
        assert_eq!(service.lock_path(), dir.path().join("cache.lock"));
    }
}
