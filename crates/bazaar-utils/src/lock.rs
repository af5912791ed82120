//! File-based locking for serializing writers across processes.
//!
//! A lock is an exclusive `flock` on a dedicated lock file. It guards shared on-disk state
//! such as the installed-package manifest against concurrent invocations.

use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

use crate::{
    error::{LockError, LockResult},
    fs::ensure_dir_exists,
};

/// An exclusive lock held on a lock file.
///
/// The lock is released when `FileLock` is dropped. `flock` locks belong to the open file
/// description, so acquiring the same path twice from one process blocks like any other
/// contender would.
pub struct FileLock {
    _file: nix::fcntl::Flock<File>,
    path: PathBuf,
}

impl FileLock {
    fn open(path: &Path) -> LockResult<File> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir_exists(parent).map_err(|err| LockError::AcquireFailed(err.to_string()))?;
        }

        Ok(OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?)
    }

    /// Acquire an exclusive lock on `path`, blocking until it is available.
    ///
    /// The lock file and its parent directories are created when missing.
    pub fn acquire<P: AsRef<Path>>(path: P) -> LockResult<Self> {
        let path = path.as_ref();
        let file = Self::open(path)?;

        let file = nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusive).map_err(
            |(_, err)| LockError::AcquireFailed(format!("{}: {}", path.display(), err)),
        )?;

        Ok(FileLock {
            path: path.to_path_buf(),
            _file: file,
        })
    }

    /// Try to acquire an exclusive lock without blocking.
    ///
    /// Returns `None` if the lock is already held elsewhere.
    pub fn try_acquire<P: AsRef<Path>>(path: P) -> LockResult<Option<Self>> {
        let path = path.as_ref();
        let file = Self::open(path)?;

        match nix::fcntl::Flock::lock(file, nix::fcntl::FlockArg::LockExclusiveNonblock) {
            Ok(file) => {
                Ok(Some(FileLock {
                    path: path.to_path_buf(),
                    _file: file,
                }))
            }
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, err)) => {
                Err(LockError::AcquireFailed(format!(
                    "{}: {}",
                    path.display(),
                    err
                )))
            }
        }
    }

    /// Get the path to the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
