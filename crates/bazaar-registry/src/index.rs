//! The registry index.
//!
//! An [`Index`] is an in-memory snapshot of every package the registry publishes. It keeps
//! the packages in document order and a derived id lookup that is rebuilt whenever the index
//! is parsed or extended; the lookup is never serialized.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    error::{RegistryError, Result},
    package::{Package, PackageId, PackageType},
};

/// Format identifier written into serialized index documents.
pub const INDEX_FORMAT: &str = "bazaar-index/v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    pub format: String,

    #[serde(default)]
    pub updated_at: DateTime<Utc>,

    #[serde(default)]
    packages: Vec<Package>,

    #[serde(skip)]
    lookup: HashMap<PackageId, usize>,
}

#[derive(Serialize)]
struct IndexDocument<'a> {
    format: &'a str,
    updated_at: DateTime<Utc>,
    packages: &'a [Package],
}

/// Aggregate numbers describing an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub total_packages: usize,
    pub by_type: BTreeMap<PackageType, usize>,
    pub total_downloads: u64,
    pub verified: usize,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.format == other.format && self.packages == other.packages
    }
}

impl Index {
    pub fn new() -> Self {
        Self {
            format: INDEX_FORMAT.to_string(),
            updated_at: Utc::now(),
            packages: Vec::new(),
            lookup: HashMap::new(),
        }
    }

    /// Builds an index from already-parsed packages, keeping their order.
    pub fn from_packages(packages: Vec<Package>) -> Self {
        let mut index = Self {
            packages,
            ..Self::new()
        };
        index.rebuild_lookup();
        index
    }

    /// Parses a registry index document.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let mut index: Index = serde_json::from_slice(bytes)?;
        index.rebuild_lookup();
        trace!(
            packages = index.packages.len(),
            format = %index.format,
            "parsed index"
        );
        Ok(index)
    }

    /// Serializes the index, stamping the current time as its update time.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let format = if self.format.is_empty() {
            INDEX_FORMAT
        } else {
            &self.format
        };
        let document = IndexDocument {
            format,
            updated_at: Utc::now(),
            packages: &self.packages,
        };
        Ok(serde_json::to_vec(&document)?)
    }

    /// Packages without a usable id stay in the list but are not reachable by id.
    fn rebuild_lookup(&mut self) {
        self.lookup.clear();
        for (pos, pkg) in self.packages.iter().enumerate() {
            if pkg.id.is_zero() {
                continue;
            }
            self.lookup.entry(pkg.id.clone()).or_insert(pos);
        }
    }

    /// All packages in document order.
    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn into_packages(self) -> Vec<Package> {
        self.packages
    }

    pub fn get(&self, id: &str) -> Option<&Package> {
        self.lookup
            .get(id)
            .and_then(|&pos| self.packages.get(pos))
            .filter(|pkg| pkg.id.as_str() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains_key(id)
    }

    /// Appends a package.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::InvalidPackage`] if the package fails validation
    /// * [`RegistryError::DuplicatePackage`] if a package with the same id exists
    pub fn add(&mut self, package: Package) -> Result<()> {
        package.validate()?;
        if self.contains(package.id.as_str()) {
            return Err(RegistryError::DuplicatePackage(package.id.to_string()));
        }
        self.lookup.insert(package.id.clone(), self.packages.len());
        self.packages.push(package);
        Ok(())
    }

    /// Packages accepted by `predicate`, in index order.
    pub fn filtered<F>(&self, predicate: F) -> Vec<&Package>
    where
        F: Fn(&Package) -> bool,
    {
        self.packages.iter().filter(|p| predicate(p)).collect()
    }

    pub fn search(&self, query: &str) -> Vec<&Package> {
        self.filtered(|p| p.matches_query(query))
    }

    pub fn search_by_type(&self, package_type: PackageType) -> Vec<&Package> {
        self.filtered(|p| p.package_type == package_type)
    }

    /// Exact, case-sensitive keyword match.
    pub fn search_by_keyword(&self, keyword: &str) -> Vec<&Package> {
        self.filtered(|p| p.keywords.iter().any(|k| k == keyword))
    }

    /// Packages by descending download count.
    pub fn list_by_popularity(&self) -> Vec<&Package> {
        let mut packages: Vec<&Package> = self.packages.iter().collect();
        packages.sort_by(|a, b| b.downloads.cmp(&a.downloads).then_with(|| a.id.cmp(&b.id)));
        packages
    }

    /// Packages by descending update time.
    pub fn list_by_recent(&self) -> Vec<&Package> {
        let mut packages: Vec<&Package> = self.packages.iter().collect();
        packages.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        packages
    }

    pub fn count(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    pub fn statistics(&self) -> IndexStats {
        let mut stats = IndexStats {
            total_packages: self.packages.len(),
            ..Default::default()
        };
        for pkg in &self.packages {
            *stats.by_type.entry(pkg.package_type).or_default() += 1;
            stats.total_downloads = stats.total_downloads.saturating_add(pkg.downloads);
            if pkg.provenance.verified {
                stats.verified += 1;
            }
        }
        stats
    }
}
