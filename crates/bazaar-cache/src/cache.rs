//! Durable on-disk cache.
//!
//! Layout under the cache root:
//!
//! ```text
//! index.json
//! index.meta.json
//! installed.json
//! packages/{id}/{version}.tar.gz
//! packages/{id}/{version}.meta.json
//! ```
//!
//! Every write creates missing directories and replaces the whole file. The cache takes no
//! locks of its own; callers that mutate it from several processes must serialize.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use bazaar_registry::{Index, InstalledPackage, PackageId};
use bazaar_utils::{
    fs::{read_optional, safe_remove, write_file},
    hash::{sha256_hex, verify_checksum},
    time::format_duration,
};
use tracing::{debug, trace};

use crate::{
    error::{CacheError, ErrorContext, Result},
    meta::CacheMeta,
};

pub const DEFAULT_INDEX_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_PACKAGE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const INDEX_FILE: &str = "index.json";
const INDEX_META_FILE: &str = "index.meta.json";
const INSTALLED_FILE: &str = "installed.json";
const PACKAGES_DIR: &str = "packages";

#[derive(Debug, Clone)]
pub struct Cache {
    root: PathBuf,
    index_ttl: Duration,
    package_ttl: Duration,
}

impl Cache {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            index_ttl: DEFAULT_INDEX_TTL,
            package_ttl: DEFAULT_PACKAGE_TTL,
        }
    }

    pub fn with_ttls(mut self, index_ttl: Duration, package_ttl: Duration) -> Self {
        self.index_ttl = index_ttl;
        self.package_ttl = package_ttl;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn index_ttl(&self) -> Duration {
        self.index_ttl
    }

    pub fn package_ttl(&self) -> Duration {
        self.package_ttl
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn installed_path(&self) -> PathBuf {
        self.root.join(INSTALLED_FILE)
    }

    fn index_meta_path(&self) -> PathBuf {
        self.root.join(INDEX_META_FILE)
    }

    fn package_paths(&self, id: &PackageId, version: &str) -> Result<(PathBuf, PathBuf)> {
        if version.is_empty()
            || version == "."
            || version == ".."
            || version.contains(['/', '\\', '\0'])
        {
            return Err(CacheError::InvalidVersion(version.to_string()));
        }

        let dir = self.root.join(PACKAGES_DIR).join(id.as_str());
        Ok((
            dir.join(format!("{version}.tar.gz")),
            dir.join(format!("{version}.meta.json")),
        ))
    }

    fn read_meta(path: &Path) -> Result<Option<CacheMeta>> {
        match read_optional(path)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Reads a cached entry and its metadata, verifying the stored checksum.
    ///
    /// `ttl` of `None` ignores expiry.
    fn read_entry(
        &self,
        key: &str,
        data_path: &Path,
        meta_path: &Path,
        ttl: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let meta =
            Self::read_meta(meta_path)?.ok_or_else(|| CacheError::CacheMiss(key.to_string()))?;

        if let Some(ttl) = ttl {
            if meta.is_expired(ttl) {
                debug!(key, age = %format_duration(meta.age()), "cache entry expired");
                return Err(CacheError::CacheExpired(key.to_string()));
            }
        }

        let data =
            read_optional(data_path)?.ok_or_else(|| CacheError::CacheMiss(key.to_string()))?;

        if !verify_checksum(&data, &meta.checksum) {
            return Err(CacheError::ChecksumMismatch {
                key: key.to_string(),
                expected: meta.checksum,
                actual: sha256_hex(&data),
            });
        }

        trace!(key, "cache hit");
        Ok(data)
    }

    fn write_entry(data_path: &Path, meta_path: &Path, data: &[u8], source: &str) -> Result<()> {
        write_file(data_path, data)?;
        let meta = CacheMeta::new(sha256_hex(data), source);
        write_file(meta_path, &serde_json::to_vec_pretty(&meta)?)?;
        Ok(())
    }

    /// Returns the cached index if it is present and younger than the index TTL.
    pub fn get_index(&self) -> Result<Index> {
        let bytes = self.read_entry(
            INDEX_FILE,
            &self.index_path(),
            &self.index_meta_path(),
            Some(self.index_ttl),
        )?;
        Ok(Index::parse(&bytes)?)
    }

    /// Returns the cached index regardless of its age.
    pub fn get_stale_index(&self) -> Result<Index> {
        let bytes = self.read_entry(INDEX_FILE, &self.index_path(), &self.index_meta_path(), None)?;
        Ok(Index::parse(&bytes)?)
    }

    /// Metadata of the cached index, if any.
    pub fn index_meta(&self) -> Result<Option<CacheMeta>> {
        Self::read_meta(&self.index_meta_path())
    }

    pub fn put_index(&self, index: &Index, source: &str) -> Result<()> {
        let bytes = index.to_json()?;
        Self::write_entry(&self.index_path(), &self.index_meta_path(), &bytes, source)?;
        debug!(packages = index.count(), source, "cached index");
        Ok(())
    }

    /// Returns cached archive bytes if present, intact and younger than the package TTL.
    pub fn get_package(&self, id: &PackageId, version: &str) -> Result<Vec<u8>> {
        let (data_path, meta_path) = self.package_paths(id, version)?;
        self.read_entry(
            &format!("{id}@{version}"),
            &data_path,
            &meta_path,
            Some(self.package_ttl),
        )
    }

    /// Like [`Cache::get_package`] but ignoring the TTL. Integrity is still verified.
    pub fn get_stale_package(&self, id: &PackageId, version: &str) -> Result<Vec<u8>> {
        let (data_path, meta_path) = self.package_paths(id, version)?;
        self.read_entry(&format!("{id}@{version}"), &data_path, &meta_path, None)
    }

    pub fn put_package(&self, id: &PackageId, version: &str, data: &[u8], source: &str) -> Result<()> {
        let (data_path, meta_path) = self.package_paths(id, version)?;
        Self::write_entry(&data_path, &meta_path, data, source)?;
        debug!(id = %id, version, size = data.len(), "cached package archive");
        Ok(())
    }

    /// Evicts a cached archive and its metadata. Missing entries are not an error.
    pub fn remove_package(&self, id: &PackageId, version: &str) -> Result<()> {
        let (data_path, meta_path) = self.package_paths(id, version)?;
        safe_remove(data_path)?;
        safe_remove(meta_path)?;
        Ok(())
    }

    /// Reads the installed manifest. A missing manifest is an empty list.
    pub fn get_installed(&self) -> Result<Vec<InstalledPackage>> {
        match read_optional(self.installed_path())? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_installed(&self, installed: &[InstalledPackage]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(installed)?;
        write_file(self.installed_path(), &bytes)?;
        Ok(())
    }

    pub fn get_installed_package(&self, id: &str) -> Result<Option<InstalledPackage>> {
        Ok(self
            .get_installed()?
            .into_iter()
            .find(|p| p.id().as_str() == id))
    }

    /// Inserts `package` into the manifest, replacing any record with the same id.
    pub fn add_installed(&self, package: InstalledPackage) -> Result<()> {
        let mut installed = self.get_installed()?;
        match installed.iter_mut().find(|p| p.id() == package.id()) {
            Some(existing) => *existing = package,
            None => installed.push(package),
        }
        self.write_installed(&installed)
    }

    /// Drops the manifest record for `id`. Returns whether a record existed.
    pub fn remove_installed(&self, id: &str) -> Result<bool> {
        let mut installed = self.get_installed()?;
        let before = installed.len();
        installed.retain(|p| p.id().as_str() != id);
        if installed.len() == before {
            return Ok(false);
        }
        self.write_installed(&installed)?;
        Ok(true)
    }

    /// Removes the whole cache tree, installed manifest included.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("removing cache directory {}", self.root.display()))?;
        }
        debug!(root = %self.root.display(), "cleared cache");
        Ok(())
    }

    /// Removes only the cached index and its metadata.
    pub fn clear_index(&self) -> Result<()> {
        safe_remove(self.index_path())?;
        safe_remove(self.index_meta_path())?;
        Ok(())
    }
}
