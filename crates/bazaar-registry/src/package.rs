//! Package metadata structures.
//!
//! This module defines the value types that describe a registry package: its validated
//! [`PackageId`], its [`PackageType`], [`Provenance`], the ordered list of
//! [`PackageVersion`]s and, once installed, the [`InstalledPackage`] record. Registry
//! documents are not always tidy, so counters accept numbers or numeric strings, the
//! `verified` flag accepts string booleans, and empty optional strings become `None`.

use std::{borrow::Borrow, fmt, path::PathBuf, str::FromStr};

use bazaar_utils::hash::{sha256_hex, verify_checksum};
use chrono::{DateTime, Utc};
use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize,
};

use tracing::warn;

use crate::error::{RegistryError, Result};

/// Version alias resolving to the newest published version.
pub const LATEST: &str = "latest";

#[derive(Deserialize)]
#[serde(untagged)]
enum FlexiBool {
    Bool(bool),
    String(String),
}

fn empty_is_none<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.filter(|s| !s.is_empty()))
}

fn flexible_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    struct CountVisitor;

    impl<'de> Visitor<'de> for CountVisitor {
        type Value = u64;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer, numeric string, or null")
        }

        fn visit_none<E>(self) -> std::result::Result<Self::Value, E> {
            Ok(0)
        }

        fn visit_unit<E>(self) -> std::result::Result<Self::Value, E> {
            Ok(0)
        }

        fn visit_u64<E>(self, v: u64) -> std::result::Result<Self::Value, E> {
            Ok(v)
        }

        fn visit_i64<E>(self, v: i64) -> std::result::Result<Self::Value, E> {
            Ok(v.max(0) as u64)
        }

        fn visit_f64<E>(self, v: f64) -> std::result::Result<Self::Value, E> {
            Ok(if v.is_finite() && v > 0.0 { v as u64 } else { 0 })
        }

        fn visit_str<E>(self, v: &str) -> std::result::Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v.trim().is_empty() {
                return Ok(0);
            }
            v.trim()
                .parse::<u64>()
                .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }

    deserializer.deserialize_any(CountVisitor)
}

fn flexible_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FlexiBool>::deserialize(deserializer)? {
        Some(FlexiBool::Bool(b)) => Ok(b),
        Some(FlexiBool::String(s)) => {
            match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" | "" => Ok(false),
                _ => {
                    Err(de::Error::invalid_value(
                        de::Unexpected::Str(&s),
                        &"a valid boolean (true/false, yes/no, 1/0)",
                    ))
                }
            }
        }
        None => Ok(false),
    }
}

/// Ids that fail validation become the zero id, which [`Package::validate`] rejects.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<PackageId, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(PackageId::default());
    };
    Ok(PackageId::new(raw.as_str()).unwrap_or_else(|err| {
        warn!(id = %raw, error = %err, "invalid package id in registry document");
        PackageId::default()
    }))
}

/// Validated package identifier.
///
/// Ids are non-empty runs of lowercase ASCII letters and digits joined by single hyphens.
/// The default value is the "zero" id, which construction never produces and which
/// [`Package::is_valid`] rejects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageId(String);

impl PackageId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(RegistryError::InvalidPackage(
                "package id cannot be empty".to_string(),
            ));
        }
        if id.starts_with('-') || id.ends_with('-') {
            return Err(RegistryError::InvalidPackage(format!(
                "package id '{id}' cannot start or end with a hyphen"
            )));
        }
        if id.contains("--") {
            return Err(RegistryError::InvalidPackage(format!(
                "package id '{id}' contains consecutive hyphens"
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '-'))
        {
            return Err(RegistryError::InvalidPackage(format!(
                "package id '{id}' contains invalid character {c:?}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for PackageId {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for PackageId {
    type Error = RegistryError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<PackageId> for String {
    fn from(id: PackageId) -> Self {
        id.0
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PackageId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Kind of configuration bundle a package distributes.
///
/// Unrecognized wire values deserialize to [`PackageType::Unknown`] so that one odd entry
/// does not make the whole index unreadable; such packages fail validation instead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageType {
    Preset,
    CapabilityPack,
    LayerTemplate,
    #[default]
    #[serde(other)]
    Unknown,
}

impl PackageType {
    pub const ALL: [PackageType; 3] = [
        PackageType::Preset,
        PackageType::CapabilityPack,
        PackageType::LayerTemplate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preset => "preset",
            Self::CapabilityPack => "capability-pack",
            Self::LayerTemplate => "layer-template",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageType {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RegistryError::InvalidPackageType(s.to_string()))
    }
}

/// Where a package comes from and whether the registry vouches for it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default)]
    pub author: String,

    #[serde(default)]
    pub repository: String,

    #[serde(default)]
    pub license: String,

    #[serde(default, deserialize_with = "flexible_bool")]
    pub verified: bool,

    #[serde(default, deserialize_with = "empty_is_none", skip_serializing_if = "Option::is_none")]
    pub signed_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_at: Option<DateTime<Utc>>,
}

impl Provenance {
    /// True when neither an author nor a source repository is known.
    pub fn is_zero(&self) -> bool {
        self.author.is_empty() && self.repository.is_empty()
    }
}

/// A single published version of a package.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,

    /// Hex-encoded SHA-256 of the version's archive.
    #[serde(default)]
    pub checksum: String,

    #[serde(default)]
    pub released_at: DateTime<Utc>,

    #[serde(default, deserialize_with = "empty_is_none", skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,

    #[serde(default, deserialize_with = "empty_is_none", skip_serializing_if = "Option::is_none")]
    pub min_tool_version: Option<String>,
}

impl PackageVersion {
    /// Verifies `data` against the recorded SHA-256 checksum.
    ///
    /// # Errors
    ///
    /// * [`RegistryError::InvalidChecksum`] if no checksum is recorded
    /// * [`RegistryError::ChecksumMismatch`] if the digest differs
    pub fn validate_checksum(&self, data: &[u8]) -> Result<()> {
        let expected = self.checksum.trim();
        if expected.is_empty() {
            return Err(RegistryError::InvalidChecksum {
                version: self.version.clone(),
            });
        }

        if !verify_checksum(data, expected) {
            return Err(RegistryError::ChecksumMismatch {
                expected: expected.to_string(),
                actual: sha256_hex(data),
            });
        }
        Ok(())
    }

    /// Whether this version can run on `tool_version`.
    ///
    /// Versions without a minimum, or whose minimum or the tool version is not valid
    /// semver, are treated as compatible.
    pub fn is_compatible_with(&self, tool_version: &str) -> bool {
        let Some(min) = self.min_tool_version.as_deref() else {
            return true;
        };
        let parse = |v: &str| semver::Version::parse(v.trim().trim_start_matches('v'));
        match (parse(min), parse(tool_version)) {
            (Ok(min), Ok(tool)) => tool >= min,
            _ => true,
        }
    }
}

/// Package metadata as published in the registry index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default, deserialize_with = "lenient_id")]
    pub id: PackageId,

    #[serde(rename = "type", default)]
    pub package_type: PackageType,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default, alias = "tags")]
    pub keywords: Vec<String>,

    #[serde(default)]
    pub provenance: Provenance,

    /// Published versions, newest first.
    #[serde(default)]
    pub versions: Vec<PackageVersion>,

    #[serde(default, deserialize_with = "flexible_count")]
    pub downloads: u64,

    #[serde(default, deserialize_with = "flexible_count")]
    pub stars: u64,

    #[serde(default)]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl Package {
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Like [`Package::is_valid`], but reports what is wrong.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_zero() {
            return Err(RegistryError::InvalidPackage(
                "package id is missing".to_string(),
            ));
        }
        if !self.package_type.is_known() {
            return Err(RegistryError::InvalidPackage(format!(
                "package '{}' has an unrecognized type",
                self.id
            )));
        }
        if self.title.trim().is_empty() {
            return Err(RegistryError::InvalidPackage(format!(
                "package '{}' has no title",
                self.id
            )));
        }
        if self.versions.is_empty() {
            return Err(RegistryError::InvalidPackage(format!(
                "package '{}' has no versions",
                self.id
            )));
        }
        Ok(())
    }

    /// Case-insensitive substring match over id, title, description, keywords and author.
    /// An empty query matches everything.
    pub fn matches_query(&self, query: &str) -> bool {
        if query.is_empty() {
            return true;
        }
        let query = query.to_lowercase();
        let contains = |field: &str| field.to_lowercase().contains(&query);

        contains(self.id.as_str())
            || contains(&self.title)
            || contains(&self.description)
            || self.keywords.iter().any(|k| contains(k))
            || contains(&self.provenance.author)
    }

    /// Case-insensitive keyword membership.
    pub fn has_keyword(&self, keyword: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| k.eq_ignore_ascii_case(keyword))
    }

    pub fn latest_version(&self) -> Option<&PackageVersion> {
        self.versions.first()
    }

    pub fn get_version(&self, version: &str) -> Option<&PackageVersion> {
        self.versions.iter().find(|v| v.version == version)
    }

    /// Resolves `"latest"` or an empty string to the newest version, anything else to the
    /// exact version string.
    pub fn resolve_version(&self, version: &str) -> Option<&PackageVersion> {
        let version = version.trim();
        if version.is_empty() || version == LATEST {
            self.latest_version()
        } else {
            self.get_version(version)
        }
    }
}

/// A package recorded in the local installed manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledPackage {
    /// Registry metadata captured at install time.
    #[serde(flatten)]
    pub package: Package,

    pub installed_version: String,

    pub installed_at: DateTime<Utc>,

    pub install_path: PathBuf,

    #[serde(default)]
    pub auto_update: bool,
}

impl InstalledPackage {
    pub fn id(&self) -> &PackageId {
        &self.package.id
    }

    /// True when the embedded package's newest version differs from the installed one.
    pub fn needs_update(&self) -> bool {
        self.package
            .latest_version()
            .is_some_and(|latest| latest.version != self.installed_version)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn version(v: &str, data: &[u8]) -> PackageVersion {
        PackageVersion {
            version: v.to_string(),
            checksum: sha256_hex(data),
            released_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            ..Default::default()
        }
    }

    fn package(id: &str) -> Package {
        Package {
            id: PackageId::new(id).unwrap(),
            package_type: PackageType::Preset,
            title: "Neovim config".to_string(),
            description: "Opinionated editor setup".to_string(),
            keywords: vec!["Editor".to_string(), "lua".to_string()],
            provenance: Provenance {
                author: "Jane Doe".to_string(),
                repository: "https://github.com/jane/nvim-config".to_string(),
                ..Default::default()
            },
            versions: vec![version("1.1.0", b"new"), version("1.0.0", b"old")],
            ..Default::default()
        }
    }

    #[test]
    fn test_package_id_accepts_valid() {
        for id in ["a", "nvim-config", "pkg2", "0", "a-b-c", "x1-y2", "9-lives"] {
            assert!(PackageId::new(id).is_ok(), "{id} should be valid");
        }
    }

    #[test]
    fn test_package_id_rejects_invalid() {
        for id in [
            "", "Nvim", "nvim_config", "-nvim", "nvim-", "nvim config", "-", "nvim.cfg", "ñ",
            "a--b",
        ] {
            assert!(
                matches!(PackageId::new(id), Err(RegistryError::InvalidPackage(_))),
                "{id:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_package_id_serde() {
        let id: PackageId = serde_json::from_str("\"nvim-config\"").unwrap();
        assert_eq!(id.as_str(), "nvim-config");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"nvim-config\"");
        assert!(serde_json::from_str::<PackageId>("\"Bad_Id\"").is_err());
        assert!(PackageId::default().is_zero());
    }

    #[test]
    fn test_package_with_invalid_id_deserializes_as_zero() {
        let json = r#"{"id": "Bad_Id", "type": "preset", "title": "Bad", "versions": []}"#;
        let pkg: Package = serde_json::from_str(json).unwrap();
        assert!(pkg.id.is_zero());
        assert!(matches!(pkg.validate(), Err(RegistryError::InvalidPackage(_))));

        let pkg: Package = serde_json::from_str(r#"{"title": "No id"}"#).unwrap();
        assert!(pkg.id.is_zero());
    }

    #[test]
    fn test_package_type_parse() {
        assert_eq!(
            "capability-pack".parse::<PackageType>().unwrap(),
            PackageType::CapabilityPack
        );
        assert_eq!(
            PackageType::LayerTemplate.to_string(),
            "layer-template"
        );
        assert!(matches!(
            "plugin".parse::<PackageType>(),
            Err(RegistryError::InvalidPackageType(t)) if t == "plugin"
        ));

        let t: PackageType = serde_json::from_str("\"plugin\"").unwrap();
        assert_eq!(t, PackageType::Unknown);
        let t: PackageType = serde_json::from_str("\"layer-template\"").unwrap();
        assert_eq!(t, PackageType::LayerTemplate);
    }

    #[test]
    fn test_validate_checksum() {
        let data = b"archive bytes".to_vec();
        let v = version("1.0.0", &data);
        v.validate_checksum(&data).unwrap();

        let upper = PackageVersion {
            checksum: v.checksum.to_uppercase(),
            ..v.clone()
        };
        upper.validate_checksum(&data).unwrap();

        for i in 0..data.len() {
            let mut mutated = data.clone();
            mutated[i] ^= 0x01;
            assert!(matches!(
                v.validate_checksum(&mutated),
                Err(RegistryError::ChecksumMismatch { .. })
            ));
        }

        let empty = PackageVersion {
            checksum: String::new(),
            ..v
        };
        assert!(matches!(
            empty.validate_checksum(&data),
            Err(RegistryError::InvalidChecksum { .. })
        ));
    }

    #[test]
    fn test_is_compatible_with() {
        let mut v = version("1.0.0", b"x");
        assert!(v.is_compatible_with("0.1.0"));

        v.min_tool_version = Some("2.3.0".to_string());
        assert!(v.is_compatible_with("2.3.0"));
        assert!(v.is_compatible_with("v2.4.1"));
        assert!(!v.is_compatible_with("2.2.9"));
        assert!(v.is_compatible_with("nightly"));
    }

    #[test]
    fn test_is_valid() {
        assert!(package("nvim-config").is_valid());

        let mut pkg = package("nvim-config");
        pkg.id = PackageId::default();
        assert!(!pkg.is_valid());

        let mut pkg = package("nvim-config");
        pkg.package_type = PackageType::Unknown;
        assert!(!pkg.is_valid());

        let mut pkg = package("nvim-config");
        pkg.title = "  ".to_string();
        assert!(!pkg.is_valid());

        let mut pkg = package("nvim-config");
        pkg.versions.clear();
        assert!(matches!(
            pkg.validate(),
            Err(RegistryError::InvalidPackage(_))
        ));
    }

    #[test]
    fn test_matches_query() {
        let pkg = package("nvim-config");
        assert!(pkg.matches_query(""));
        assert!(pkg.matches_query("NVIM"));
        assert!(pkg.matches_query("neovim"));
        assert!(pkg.matches_query("opinionated"));
        assert!(pkg.matches_query("editor"));
        assert!(pkg.matches_query("jane"));
        assert!(!pkg.matches_query("emacs"));
    }

    #[test]
    fn test_version_resolution() {
        let pkg = package("nvim-config");
        assert_eq!(pkg.latest_version().unwrap().version, "1.1.0");
        assert_eq!(pkg.resolve_version("latest").unwrap().version, "1.1.0");
        assert_eq!(pkg.resolve_version("").unwrap().version, "1.1.0");
        assert_eq!(pkg.resolve_version("1.0.0").unwrap().version, "1.0.0");
        assert!(pkg.resolve_version("2.0.0").is_none());
        assert!(pkg.has_keyword("editor"));
        assert!(!pkg.has_keyword("edit"));
    }

    #[test]
    fn test_provenance_zero() {
        assert!(Provenance::default().is_zero());
        assert!(!package("nvim-config").provenance.is_zero());
    }

    #[test]
    fn test_flexible_fields() {
        let json = r#"{
            "id": "nvim-config",
            "type": "preset",
            "title": "Neovim",
            "downloads": "1200",
            "stars": null,
            "provenance": {"author": "jane", "verified": "yes", "signed_by": ""},
            "versions": [{"version": "1.0.0", "checksum": "abc", "released_at": "2024-03-01T00:00:00Z", "changelog": ""}]
        }"#;

        let pkg: Package = serde_json::from_str(json).unwrap();
        assert_eq!(pkg.downloads, 1200);
        assert_eq!(pkg.stars, 0);
        assert!(pkg.provenance.verified);
        assert!(pkg.provenance.signed_by.is_none());
        assert!(pkg.versions[0].changelog.is_none());
        assert!(pkg.is_valid());
    }

    #[test]
    fn test_installed_package_needs_update() {
        let installed = InstalledPackage {
            package: package("nvim-config"),
            installed_version: "1.0.0".to_string(),
            installed_at: Utc::now(),
            install_path: PathBuf::from("/opt/bazaar/nvim-config/1.0.0"),
            auto_update: true,
        };
        assert!(installed.needs_update());

        let current = InstalledPackage {
            installed_version: "1.1.0".to_string(),
            ..installed.clone()
        };
        assert!(!current.needs_update());

        let mut no_versions = installed.clone();
        no_versions.package.versions.clear();
        assert!(!no_versions.needs_update());
    }

    #[test]
    fn test_installed_package_json_is_flat() {
        let installed = InstalledPackage {
            package: package("nvim-config"),
            installed_version: "1.0.0".to_string(),
            installed_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            install_path: PathBuf::from("/opt/bazaar/nvim-config/1.0.0"),
            auto_update: false,
        };

        let value = serde_json::to_value(&installed).unwrap();
        assert_eq!(value["id"], "nvim-config");
        assert_eq!(value["type"], "preset");
        assert_eq!(value["installed_version"], "1.0.0");

        let back: InstalledPackage = serde_json::from_value(value).unwrap();
        assert_eq!(back, installed);
    }
}
