use std::{
    fs,
    io::{self, ErrorKind},
    path::Path,
};

use crate::error::{FileSystemError, FileSystemResult};

/// Removes the specified file or directory.
///
/// Missing paths are not an error. Directories are removed recursively.
///
/// # Errors
///
/// Returns a [`FileSystemError::File`] if the removal fails for any reason other than the
/// path not existing (e.g., permission denied).
///
/// # Example
///
/// ```no_run
/// use bazaar_utils::fs::safe_remove;
///
/// safe_remove("/tmp/bazaar/packages/nvim-config").unwrap();
/// ```
pub fn safe_remove<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();

    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
        Err(err) => {
            return Err(FileSystemError::File {
                path: path.to_path_buf(),
                action: "inspect",
                source: err,
            })
        }
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };

    result.map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "remove",
            source: err,
        }
    })
}

/// Creates a directory structure if it doesn't exist.
///
/// # Errors
///
/// * [`FileSystemError::Directory`] if the directory could not be created.
/// * [`FileSystemError::NotADirectory`] if the path exists but is not a directory.
pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> FileSystemResult<()> {
    let path = path.as_ref();
    if !path.exists() {
        fs::create_dir_all(path).map_err(|err| {
            FileSystemError::Directory {
                path: path.to_path_buf(),
                action: "create",
                source: err,
            }
        })?;
    } else if !path.is_dir() {
        return Err(FileSystemError::NotADirectory {
            path: path.to_path_buf(),
        });
    }

    Ok(())
}

/// Writes `contents` to `path`, creating missing parent directories first.
///
/// The file is replaced as a whole; there is no partial-write recovery.
pub fn write_file<P: AsRef<Path>>(path: P, contents: &[u8]) -> FileSystemResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir_exists(parent)?;
    }

    fs::write(path, contents).map_err(|err| {
        FileSystemError::File {
            path: path.to_path_buf(),
            action: "write",
            source: err,
        }
    })
}

/// Reads a whole file, mapping a missing file to `Ok(None)`.
pub fn read_optional<P: AsRef<Path>>(path: P) -> FileSystemResult<Option<Vec<u8>>> {
    let path = path.as_ref();
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(FileSystemError::File {
                path: path.to_path_buf(),
                action: "read",
                source: err,
            })
        }
    }
}

/// Renames `from` to `to`, replacing an existing directory at `to`.
pub fn replace_dir<P: AsRef<Path>, Q: AsRef<Path>>(from: P, to: Q) -> FileSystemResult<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    safe_remove(to)?;
    if let Some(parent) = to.parent() {
        ensure_dir_exists(parent)?;
    }
    fs::rename(from, to).map_err(|err: io::Error| {
        FileSystemError::Directory {
            path: to.to_path_buf(),
            action: "move into",
            source: err,
        }
    })
}
