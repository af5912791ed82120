use bazaar_core::{BazaarError, BazaarResult};
use bazaar_registry::InstalledPackage;
use tracing::info;

use crate::Service;

impl Service {
    /// Removes an installed package's files and its manifest entry.
    ///
    /// Returns the record that was removed.
    pub fn uninstall(&self, id: &str) -> BazaarResult<InstalledPackage> {
        let _lock = self.lock()?;

        let record = self
            .cache
            .get_installed_package(id)?
            .ok_or_else(|| BazaarError::NotInstalled(id.to_string()))?;

        self.remove_install_dir(&record.install_path)?;
        self.cache.remove_installed(id)?;

        info!(id = id, version = %record.installed_version, "uninstalled package");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::test_utils::{package, package_archive, TestEnv};

    #[test]
    fn test_uninstall() {
        let env = TestEnv::new();
        env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
        env.serve_archive("nvim-config", "1.0.0", package_archive("nvim-config", "1.0.0"));

        let service = env.service();
        let installed = service.install("nvim-config", "1.0.0").unwrap();
        assert!(installed.install_path.exists());

        let removed = service.uninstall("nvim-config").unwrap();
        assert_eq!(removed.installed_version, "1.0.0");
        assert!(!installed.install_path.exists());
        assert!(!env.install_dir().join("nvim-config").exists());
        assert!(service.list_installed().unwrap().is_empty());
    }

    #[test]
    fn test_uninstall_not_installed() {
        let env = TestEnv::new();
        assert!(matches!(
            env.service().uninstall("nvim-config"),
            Err(BazaarError::NotInstalled(id)) if id == "nvim-config"
        ));
    }

    #[test]
    fn test_uninstall_with_missing_directory() {
        let env = TestEnv::new();
        env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
        env.serve_archive("nvim-config", "1.0.0", package_archive("nvim-config", "1.0.0"));

        let service = env.service();
        let installed = service.install("nvim-config", "1.0.0").unwrap();
        fs::remove_dir_all(&installed.install_path).unwrap();

        service.uninstall("nvim-config").unwrap();
        assert!(service.list_installed().unwrap().is_empty());
    }

    #[test]
    fn test_uninstall_leaves_paths_outside_install_root() {
        let env = TestEnv::new();
        env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
        env.serve_archive("nvim-config", "1.0.0", package_archive("nvim-config", "1.0.0"));

        let service = env.service();
        let mut record = service.install("nvim-config", "1.0.0").unwrap();

        let outside = env.dir.path().join("elsewhere");
        fs::create_dir_all(&outside).unwrap();
        record.install_path = outside.clone();
        service.cache().add_installed(record).unwrap();

        service.uninstall("nvim-config").unwrap();
        assert!(outside.exists());
        assert!(service.list_installed().unwrap().is_empty());
    }
}
