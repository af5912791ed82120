use bazaar_core::{BazaarError, BazaarResult};
use bazaar_registry::{Index, InstalledPackage, PackageVersion, RegistryError};
use bazaar_utils::fs::safe_remove;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::{FailedInfo, Service, UpdateInfo, UpdateReport};

impl Service {
    fn update_info(&self, record: &InstalledPackage, latest: &PackageVersion) -> UpdateInfo {
        UpdateInfo {
            id: record.package.id.clone(),
            current_version: record.installed_version.clone(),
            new_version: latest.version.clone(),
            changelog: latest.changelog.clone(),
            released_at: latest.released_at,
            compatible: self
                .tool_version
                .as_deref()
                .map_or(true, |tool| latest.is_compatible_with(tool)),
        }
    }

    /// Lists installed packages whose newest indexed version differs from the installed
    /// one. Packages no longer in the index are skipped.
    pub fn check_updates(&self) -> BazaarResult<Vec<UpdateInfo>> {
        let installed = self.cache.get_installed()?;
        if installed.is_empty() {
            return Ok(Vec::new());
        }

        let index = self.get_index()?;
        let mut updates = Vec::new();
        for record in &installed {
            let Some(package) = index.get(record.id().as_str()) else {
                debug!(id = %record.id(), "installed package is not in the index");
                continue;
            };
            if let Some(latest) = package.latest_version() {
                if latest.version != record.installed_version {
                    updates.push(self.update_info(record, latest));
                }
            }
        }
        Ok(updates)
    }

    /// Moves an installed package to the newest indexed version.
    ///
    /// The new version is extracted and recorded before the old directory is removed, so a
    /// failed download or extraction leaves the current installation untouched. A package
    /// that is already current is returned unchanged.
    pub fn update(&self, id: &str) -> BazaarResult<InstalledPackage> {
        let _lock = self.lock()?;
        let record = self
            .cache
            .get_installed_package(id)?
            .ok_or_else(|| BazaarError::NotInstalled(id.to_string()))?;
        let index = self.get_index()?;
        let (record, _) = self.update_with_index(record, &index)?;
        Ok(record)
    }

    fn update_with_index(
        &self,
        current: InstalledPackage,
        index: &Index,
    ) -> BazaarResult<(InstalledPackage, Option<UpdateInfo>)> {
        let id = current.id().to_string();
        let package = index
            .get(&id)
            .ok_or_else(|| RegistryError::PackageNotFound(id.clone()))?;
        let latest = package
            .latest_version()
            .ok_or_else(|| BazaarError::VersionNotFound {
                id: id.clone(),
                version: bazaar_registry::LATEST.to_string(),
            })?;

        if latest.version == current.installed_version {
            debug!(id = id, version = %latest.version, "package is up to date");
            return Ok((current, None));
        }

        let info = self.update_info(&current, latest);
        if !info.compatible {
            warn!(
                id = id,
                version = %latest.version,
                "new version requires a newer tool version"
            );
        }

        let dir = self.fetch_and_extract(package, latest)?;
        let record = InstalledPackage {
            package: package.clone(),
            installed_version: latest.version.clone(),
            installed_at: Utc::now(),
            install_path: dir.clone(),
            auto_update: current.auto_update,
        };
        if let Err(err) = self.cache.add_installed(record.clone()) {
            let _ = safe_remove(&dir);
            return Err(err.into());
        }

        if current.install_path != dir {
            if let Err(err) = self.remove_install_dir(&current.install_path) {
                warn!(
                    id = id,
                    path = %current.install_path.display(),
                    error = %err,
                    "failed to remove previous version"
                );
            }
        }

        info!(
            id = id,
            from = %info.current_version,
            to = %info.new_version,
            "updated package"
        );
        Ok((record, Some(info)))
    }

    /// Updates every installed package, force-including those without `auto_update`.
    pub fn update_all(&self) -> BazaarResult<UpdateReport> {
        self.update_all_with(true)
    }

    /// Updates installed packages one by one, collecting per-package outcomes.
    ///
    /// Without `force`, packages whose `auto_update` flag is off are reported as unchanged.
    /// Failures never abort the batch; the call itself only fails when the installed
    /// manifest cannot be read.
    pub fn update_all_with(&self, force: bool) -> BazaarResult<UpdateReport> {
        let _lock = self.lock()?;
        let installed = self.cache.get_installed()?;
        let mut report = UpdateReport::default();

        let (candidates, skipped): (Vec<_>, Vec<_>) = installed
            .into_iter()
            .partition(|record| force || record.auto_update);
        report
            .unchanged
            .extend(skipped.iter().map(|record| record.id().to_string()));

        if candidates.is_empty() {
            return Ok(report);
        }

        let index = match self.get_index() {
            Ok(index) => index,
            Err(err) => {
                warn!(error = %err, "cannot load index for batch update");
                let error = err.to_string();
                report
                    .failed
                    .extend(candidates.iter().map(|record| FailedInfo {
                        id: record.id().to_string(),
                        error: error.clone(),
                    }));
                return Ok(report);
            }
        };

        for record in candidates {
            let id = record.id().to_string();
            match self.update_with_index(record, &index) {
                Ok((_, Some(info))) => report.updated.push(info),
                Ok((_, None)) => report.unchanged.push(id),
                Err(err) => {
                    warn!(id = id, error = %err, "failed to update package");
                    report.failed.push(FailedInfo {
                        id,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }
}
