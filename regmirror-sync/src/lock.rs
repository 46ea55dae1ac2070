//! Single-run lock.
//!
//! A lock file created with `create_new` guarantees at most one reconciliation
//! run at a time on a host. The file holds the epoch second it was taken.
//! A [`RunLock`] releases itself on drop, so every exit path of a run, panics
//! included, frees it.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{io_err, SyncError};

/// Held lock. Dropping it removes the lock file.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    acquired_at: i64,
    released: bool,
}

impl RunLock {
    /// Take the lock at `path`, stamping it with `now`.
    ///
    /// Fails with [`SyncError::LockHeld`] when the file already exists; the
    /// existing file is left untouched.
    pub fn acquire(path: &Path, now: i64) -> Result<Self, SyncError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(SyncError::LockHeld {
                    path: path.to_path_buf(),
                    acquired_at: Self::read_timestamp(path),
                });
            }
            Err(err) => return Err(io_err(path, err)),
        };

        let lock = RunLock {
            path: path.to_path_buf(),
            acquired_at: now,
            released: false,
        };
        // From here on `lock` owns the file; a failed write still removes it.
        writeln!(file, "{now}").map_err(|e| io_err(path, e))?;
        tracing::debug!("lock acquired at {}", path.display());
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn acquired_at(&self) -> i64 {
        self.acquired_at
    }

    /// Timestamp written into an existing lock file, if readable.
    pub fn read_timestamp(path: &Path) -> Option<i64> {
        std::fs::read_to_string(path)
            .ok()
            .and_then(|contents| contents.trim().parse().ok())
    }

    /// Remove a lock left behind by a run that no longer exists.
    ///
    /// Returns `Some(timestamp)` for a removed lock (0 when unreadable) and
    /// `None` when there was no lock file.
    pub fn force_release(path: &Path) -> Result<Option<i64>, SyncError> {
        if !path.exists() {
            return Ok(None);
        }
        let acquired_at = Self::read_timestamp(path);
        remove_lock_file(path)?;
        tracing::warn!("forcibly removed lock at {}", path.display());
        Ok(Some(acquired_at.unwrap_or_default()))
    }

    /// Release explicitly, surfacing removal errors.
    pub fn release(mut self) -> Result<(), SyncError> {
        self.released = true;
        remove_lock_file(&self.path)
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = remove_lock_file(&self.path) {
            tracing::error!("failed to release lock: {err}");
        }
    }
}

fn remove_lock_file(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!("lock released at {}", path.display());
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(path, err)),
    }
}
