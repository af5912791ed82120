use std::path::PathBuf;

use bazaar_core::{archive::install_archive, BazaarError, BazaarResult};
use bazaar_registry::{InstalledPackage, Package, PackageId, PackageVersion, RegistryError};
use bazaar_utils::{fs::safe_remove, path::is_within};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::Service;

impl Service {
    /// Directory a given package version is extracted into.
    pub fn package_dir(&self, id: &PackageId, version: &str) -> PathBuf {
        self.install_path.join(id.as_str()).join(version)
    }

    /// Returns the archive bytes for `id@version`, from the cache when possible.
    ///
    /// Network downloads are written back to the cache; a failed write is only logged.
    /// In offline mode an expired cache entry is accepted. The bytes are not checked
    /// against the package's published checksum here.
    pub fn download_package(&self, id: &PackageId, version: &str) -> BazaarResult<Vec<u8>> {
        match self.cache.get_package(id, version) {
            Ok(data) => return Ok(data),
            Err(err) if err.is_miss() => {
                debug!(id = %id, version, reason = %err, "archive not usable from cache")
            }
            Err(err) => return Err(err.into()),
        }

        if self.offline {
            return match self.cache.get_stale_package(id, version) {
                Ok(data) => Ok(data),
                Err(err) if err.is_miss() => {
                    Err(Self::offline_error(&format!(
                        "package {id}@{version} is not cached"
                    )))
                }
                Err(err) => Err(err.into()),
            };
        }

        let data = self.client.fetch_package(id, version)?;
        let source = self.client.package_url(id, version)?;
        if let Err(err) = self
            .cache
            .put_package(id, version, &data, source.as_str())
        {
            warn!(id = %id, version, error = %err, "failed to cache package archive");
        }
        Ok(data)
    }

    /// Downloads, verifies and extracts `target` of `package`.
    ///
    /// Archives that fail verification are evicted from the cache so the next attempt
    /// downloads them again.
    pub(crate) fn fetch_and_extract(
        &self,
        package: &Package,
        target: &PackageVersion,
    ) -> BazaarResult<PathBuf> {
        let data = self.download_package(&package.id, &target.version)?;

        if let Err(err) = target.validate_checksum(&data) {
            warn!(
                id = %package.id,
                version = %target.version,
                error = %err,
                "archive verification failed"
            );
            if let Err(evict_err) = self.cache.remove_package(&package.id, &target.version) {
                warn!(error = %evict_err, "failed to evict archive from cache");
            }
            return Err(err.into());
        }

        let dir = self.package_dir(&package.id, &target.version);
        install_archive(&data, &dir)?;
        Ok(dir)
    }

    /// Removes an install directory, refusing anything outside the install root.
    pub(crate) fn remove_install_dir(&self, dir: &std::path::Path) -> BazaarResult<()> {
        if !is_within(dir, &self.install_path) || dir == self.install_path {
            warn!(
                path = %dir.display(),
                "install directory is outside the install root, leaving it in place"
            );
            return Ok(());
        }

        safe_remove(dir)?;
        if let Some(parent) = dir.parent().filter(|p| *p != self.install_path) {
            // Only succeeds once the last version directory of the package is gone.
            let _ = std::fs::remove_dir(parent);
        }
        Ok(())
    }

    /// Installs `version` of package `id`. `"latest"` or an empty string selects the
    /// newest version.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::PackageNotFound`] if the id is not in the index
    /// * [`BazaarError::VersionNotFound`] if the version does not exist
    /// * [`BazaarError::AlreadyInstalled`] if that exact version is already installed
    /// * [`RegistryError::ChecksumMismatch`] if the archive does not match its checksum
    /// * [`BazaarError::UnsafeArchivePath`] if an archive entry would escape the target
    pub fn install(&self, id: &str, version: &str) -> BazaarResult<InstalledPackage> {
        let _lock = self.lock()?;
        self.install_locked(id, version)
    }

    fn install_locked(&self, id: &str, version: &str) -> BazaarResult<InstalledPackage> {
        let index = self.get_index()?;
        let package = index
            .get(id)
            .ok_or_else(|| RegistryError::PackageNotFound(id.to_string()))?;
        let target = package.resolve_version(version).ok_or_else(|| {
            BazaarError::VersionNotFound {
                id: id.to_string(),
                version: version.to_string(),
            }
        })?;

        let existing = self.cache.get_installed_package(id)?;
        if let Some(existing) = &existing {
            if existing.installed_version == target.version {
                return Err(BazaarError::AlreadyInstalled {
                    id: id.to_string(),
                    version: target.version.clone(),
                });
            }
        }

        debug!(id = id, version = %target.version, "installing package");
        let dir = self.fetch_and_extract(package, target)?;

        let record = InstalledPackage {
            package: package.clone(),
            installed_version: target.version.clone(),
            installed_at: Utc::now(),
            install_path: dir.clone(),
            auto_update: existing.as_ref().is_some_and(|e| e.auto_update),
        };
        if let Err(err) = self.cache.add_installed(record.clone()) {
            let _ = safe_remove(&dir);
            return Err(err.into());
        }

        // The manifest already points at the new version; a leftover directory is not fatal.
        if let Some(previous) = existing.filter(|p| p.install_path != dir) {
            if let Err(err) = self.remove_install_dir(&previous.install_path) {
                warn!(
                    id = id,
                    path = %previous.install_path.display(),
                    error = %err,
                    "failed to remove previous version"
                );
            }
        }

        info!(id = id, version = %record.installed_version, "installed package");
        Ok(record)
    }

    /// Turns automatic updates on or off for an installed package.
    pub fn set_auto_update(&self, id: &str, enabled: bool) -> BazaarResult<InstalledPackage> {
        let _lock = self.lock()?;
        let mut record = self
            .cache
            .get_installed_package(id)?
            .ok_or_else(|| BazaarError::NotInstalled(id.to_string()))?;
        record.auto_update = enabled;
        self.cache.add_installed(record.clone())?;
        Ok(record)
    }
}
