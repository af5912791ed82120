use bazaar_core::{BazaarError, BazaarResult};
use bazaar_registry::{IndexStats, InstalledPackage, Package, PackageType, RegistryError};
use tracing::debug;

use crate::Service;

impl Service {
    /// Case-insensitive search over the index. An empty query returns every package.
    pub fn search(&self, query: &str) -> BazaarResult<Vec<Package>> {
        debug!(query = query, "searching packages");
        let index = self.get_index()?;
        Ok(index.search(query).into_iter().cloned().collect())
    }

    pub fn search_by_type(&self, package_type: PackageType) -> BazaarResult<Vec<Package>> {
        debug!(package_type = %package_type, "listing packages by type");
        let index = self.get_index()?;
        Ok(index
            .search_by_type(package_type)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Looks up a package by id.
    pub fn get(&self, id: &str) -> BazaarResult<Package> {
        let index = self.get_index()?;
        index
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::PackageNotFound(id.to_string()).into())
    }

    pub fn statistics(&self) -> BazaarResult<IndexStats> {
        Ok(self.get_index()?.statistics())
    }

    /// All records of the installed manifest.
    pub fn list_installed(&self) -> BazaarResult<Vec<InstalledPackage>> {
        Ok(self.cache.get_installed()?)
    }

    /// The installed record for `id`.
    pub fn installed(&self, id: &str) -> BazaarResult<InstalledPackage> {
        self.cache
            .get_installed_package(id)?
            .ok_or_else(|| BazaarError::NotInstalled(id.to_string()))
    }
}
