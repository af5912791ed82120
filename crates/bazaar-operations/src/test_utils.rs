use std::{path::PathBuf, time::Duration};

use bazaar_cache::{Cache, DEFAULT_PACKAGE_TTL};
use bazaar_registry::{
    ClientConfig, Package, PackageId, PackageType, PackageVersion, Provenance, RegistryClient,
};
use bazaar_utils::hash::sha256_hex;
use chrono::{TimeZone, Utc};
use flate2::{write::GzEncoder, Compression};
use httpmock::{prelude::*, Mock};
use serde_json::json;
use tar::{Builder, EntryType, Header};
use tempfile::TempDir;

use crate::Service;

/// A mock registry plus scratch directories for cache and installs.
pub struct TestEnv {
    pub server: MockServer,
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            server: MockServer::start(),
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn client(&self) -> RegistryClient {
        RegistryClient::new(&self.server.base_url(), ClientConfig::default()).unwrap()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn install_dir(&self) -> PathBuf {
        self.dir.path().join("packages")
    }

    pub fn service(&self) -> Service {
        Service::new(Cache::new(self.cache_dir()), self.client(), self.install_dir())
    }

    pub fn service_with_ttl(&self, index_ttl: Duration) -> Service {
        let cache = Cache::new(self.cache_dir()).with_ttls(index_ttl, DEFAULT_PACKAGE_TTL);
        Service::new(cache, self.client(), self.install_dir())
    }

    pub fn serve_index(&self, packages: &[Package]) -> Mock<'_> {
        let body = index_doc(packages);
        self.server.mock(|when, then| {
            when.method(GET).path("/v1/index.json");
            then.status(200).json_body(body);
        })
    }

    pub fn serve_archive(&self, id: &str, version: &str, data: Vec<u8>) -> Mock<'_> {
        let path = format!("/v1/packages/{id}/{version}.tar.gz");
        self.server.mock(|when, then| {
            when.method(GET).path(path);
            then.status(200).body(data);
        })
    }
}

pub fn index_doc(packages: &[Package]) -> serde_json::Value {
    json!({
        "format": "bazaar-index/v1",
        "updated_at": "2024-06-01T00:00:00Z",
        "packages": packages,
    })
}

pub fn archive(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, data) in files {
        let mut header = Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_entry_type(EntryType::Regular);
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Archive with a single marker file naming the package and version.
pub fn package_archive(id: &str, version: &str) -> Vec<u8> {
    let marker = format!("{id} {version}");
    archive(&[("README.md", marker.as_bytes())])
}

pub fn version(version: &str, data: &[u8]) -> PackageVersion {
    PackageVersion {
        version: version.to_string(),
        checksum: sha256_hex(data),
        released_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        changelog: Some(format!("Release {version}")),
        min_tool_version: None,
    }
}

/// A valid preset whose single version `1.0.0` matches [`package_archive`].
pub fn package(id: &str, downloads: u64, stars: u64, keywords: &[&str]) -> Package {
    Package {
        id: PackageId::new(id).unwrap(),
        package_type: PackageType::Preset,
        title: id.replace('-', " "),
        description: format!("The {id} package"),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        provenance: Provenance {
            author: "someone".to_string(),
            repository: format!("https://github.com/someone/{id}"),
            license: "MIT".to_string(),
            ..Default::default()
        },
        versions: vec![version("1.0.0", &package_archive(id, "1.0.0"))],
        downloads,
        stars,
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
    }
}
