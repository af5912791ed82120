//! Safe extraction of gzip-compressed tar archives.
//!
//! Archives come from the network, so every entry path is checked before anything is
//! written: only plain relative components are accepted, and link entries are refused.
//! Extraction happens in a staging directory next to the target which is renamed into place
//! once the whole archive has been unpacked.

use std::{
    fs,
    path::{Component, Path},
};

use bazaar_utils::fs::{ensure_dir_exists, replace_dir};
use flate2::read::GzDecoder;
use tar::{Archive, EntryType};
use tracing::{debug, trace};

use crate::{
    error::{BazaarError, ErrorContext},
    BazaarResult,
};

fn validate_entry_path(path: &Path) -> BazaarResult<()> {
    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(BazaarError::UnsafeArchivePath(path.display().to_string())),
        }
    }
    Ok(())
}

/// Pax and GNU extension headers that carry attributes for other entries, not content.
fn is_metadata_entry(entry_type: EntryType) -> bool {
    entry_type.is_pax_global_extensions()
        || entry_type.is_pax_local_extensions()
        || entry_type.is_gnu_longname()
        || entry_type.is_gnu_longlink()
}

/// Unpacks `data` into `dest`, which must already exist.
///
/// Returns the number of regular files written. Stops at the first offending entry;
/// files written before it stay in `dest`, so callers extract into a scratch directory.
pub fn extract_to(data: &[u8], dest: &Path) -> BazaarResult<usize> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let entries = archive
        .entries()
        .with_context(|| "reading archive entries".to_string())?;

    let mut files = 0;
    for entry in entries {
        let mut entry = entry.with_context(|| "reading archive entry".to_string())?;
        if is_metadata_entry(entry.header().entry_type()) {
            trace!(entry_type = ?entry.header().entry_type(), "skipping metadata entry");
            continue;
        }
        let entry_path = entry
            .path()
            .with_context(|| "decoding archive entry path".to_string())?
            .into_owned();
        validate_entry_path(&entry_path)?;

        let out_path = dest.join(&entry_path);
        match entry.header().entry_type() {
            EntryType::Directory => {
                ensure_dir_exists(&out_path)?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = out_path.parent() {
                    ensure_dir_exists(parent)?;
                }
                entry
                    .unpack(&out_path)
                    .with_context(|| format!("extracting {}", entry_path.display()))?;
                trace!(path = %entry_path.display(), "extracted file");
                files += 1;
            }
            EntryType::Symlink | EntryType::Link => {
                return Err(BazaarError::UnsafeArchivePath(format!(
                    "{} (link entries are not allowed)",
                    entry_path.display()
                )));
            }
            other => {
                return Err(BazaarError::InstallFailed(format!(
                    "unsupported archive entry type {other:?} for {}",
                    entry_path.display()
                )));
            }
        }
    }

    Ok(files)
}

/// Extracts `data` into `target`, replacing whatever was there.
///
/// The archive is unpacked into a hidden staging directory beside `target` first; `target`
/// is only touched once extraction succeeded.
pub fn install_archive(data: &[u8], target: &Path) -> BazaarResult<usize> {
    let parent = target.parent().ok_or_else(|| {
        BazaarError::InstallFailed(format!("{} has no parent directory", target.display()))
    })?;
    ensure_dir_exists(parent)?;

    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(parent)
        .with_context(|| format!("creating staging directory in {}", parent.display()))?;

    let files = extract_to(data, staging.path())?;
    let staged = staging.keep();
    if let Err(err) = replace_dir(&staged, target) {
        let _ = fs::remove_dir_all(&staged);
        return Err(err.into());
    }

    debug!(target = %target.display(), files, "installed archive");
    Ok(files)
}
