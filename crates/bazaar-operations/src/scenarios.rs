//! End-to-end flows against a mock registry.

use std::{thread, time::Duration};

use bazaar_core::BazaarError;
use bazaar_registry::RegistryError;
use flate2::{write::GzEncoder, Compression};
use tar::{Builder, EntryType, Header};

use crate::{
    test_utils::{archive, package, package_archive, version, TestEnv},
    Recommender,
};

#[test]
fn test_search_and_popular_ranking() {
    let env = TestEnv::new();
    env.serve_index(&[
        package("vscode-config", 10, 0, &["editor"]),
        package("nvim-config", 1000, 50, &["editor"]),
    ]);
    let service = env.service();

    let found: Vec<_> = service
        .search("nvim")
        .unwrap()
        .into_iter()
        .map(|p| p.id.to_string())
        .collect();
    assert_eq!(found, vec!["nvim-config"]);

    let popular = Recommender::new(&service).popular_packages(None).unwrap();
    assert_eq!(popular[0].package.id.as_str(), "nvim-config");
}

#[test]
fn test_tampered_archive_is_not_installed() {
    let env = TestEnv::new();
    env.serve_index(&[package("pkg", 1, 1, &[])]);
    env.serve_archive("pkg", "1.0.0", archive(&[("README.md", b"not what was published")]));
    let service = env.service();

    assert!(matches!(
        service.install("pkg", "1.0.0"),
        Err(BazaarError::Registry(RegistryError::ChecksumMismatch { .. }))
    ));
    assert!(service.list_installed().unwrap().is_empty());
}

#[test]
fn test_offline_answers_from_stale_cache() {
    let env = TestEnv::new();
    env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
    let ttl = Duration::from_millis(50);

    let offline = env.service_with_ttl(ttl).with_offline(true);
    let err = offline.search("nvim").unwrap_err();
    assert!(matches!(err, BazaarError::Offline(_)));
    assert!(err.to_string().to_lowercase().contains("offline mode"));

    env.service_with_ttl(ttl).refresh_index().unwrap();
    thread::sleep(Duration::from_millis(120));

    assert_eq!(offline.search("nvim").unwrap().len(), 1);
    assert_eq!(offline.get("nvim-config").unwrap().stars, 50);
}

#[test]
fn test_reinstall_after_uninstall() {
    let env = TestEnv::new();
    env.serve_index(&[package("nvim-config", 1000, 50, &["editor"])]);
    env.serve_archive("nvim-config", "1.0.0", package_archive("nvim-config", "1.0.0"));
    let service = env.service();

    service.install("nvim-config", "1.0.0").unwrap();
    assert!(matches!(
        service.install("nvim-config", "1.0.0"),
        Err(BazaarError::AlreadyInstalled { id, version }) if id == "nvim-config" && version == "1.0.0"
    ));

    service.uninstall("nvim-config").unwrap();
    let record = service.install("nvim-config", "1.0.0").unwrap();
    assert!(record.install_path.join("README.md").exists());
}

#[test]
fn test_path_traversal_archive_is_rejected() {
    let mut builder = Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let data = b"root:x:0:0::/root:/bin/sh\n";
    let mut header = Header::new_old();
    let name = b"../../etc/passwd";
    header.as_old_mut().name[..name.len()].copy_from_slice(name);
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_entry_type(EntryType::Regular);
    header.set_cksum();
    builder.append(&header, &data[..]).unwrap();
    let evil = builder.into_inner().unwrap().finish().unwrap();

    let env = TestEnv::new();
    let mut pkg = package("evil-config", 0, 0, &[]);
    pkg.versions = vec![version("1.0.0", &evil)];
    env.serve_index(&[pkg]);
    env.serve_archive("evil-config", "1.0.0", evil);
    let service = env.service();

    assert!(matches!(
        service.install("evil-config", "1.0.0"),
        Err(BazaarError::UnsafeArchivePath(_))
    ));
    assert!(!env.dir.path().join("etc/passwd").exists());
    assert!(!env.install_dir().join("etc").exists());
    assert!(!env.install_dir().join("evil-config/1.0.0").exists());
    assert!(service.list_installed().unwrap().is_empty());
}
