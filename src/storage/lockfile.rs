//! Process lock file
//!
//! sled refuses a second opener of the same directory with an opaque I/O
//! error; the lock file turns that into a readable startup error naming the
//! PID that holds the database.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOCK_FILE_NAME: &str = ".plc-oee.lock";

#[derive(Debug, Error)]
pub enum LockError {
    #[error(
        "another plc-oee instance is already running (PID {pid}); \
         stop it, or remove the stale lock file {}",
        .path.display()
    )]
    AlreadyRunning { pid: u32, path: PathBuf },

    #[error("lock file I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive claim on a data directory, released on drop.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    /// Acquire the lock for `data_dir`, creating the directory if needed.
    ///
    /// A lock file left by a process that is no longer running is replaced.
    pub fn acquire<P: AsRef<Path>>(data_dir: P) -> Result<Self, LockError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir).map_err(|source| LockError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;

        let lock_path = data_dir.join(LOCK_FILE_NAME);
        if lock_path.exists() {
            match Self::holder(&lock_path) {
                Some(pid) if Self::is_process_running(pid) => {
                    return Err(LockError::AlreadyRunning {
                        pid,
                        path: lock_path,
                    });
                }
                holder => {
                    tracing::info!(stale_pid = ?holder, "Removing stale lock file");
                    if let Err(e) = fs::remove_file(&lock_path) {
                        tracing::warn!(error = %e, "Failed to remove stale lock file");
                    }
                }
            }
        }

        let pid = std::process::id();
        fs::write(&lock_path, format!("{pid}\n")).map_err(|source| LockError::Io {
            path: lock_path.clone(),
            source,
        })?;
        tracing::debug!(pid, path = %lock_path.display(), "Acquired process lock");

        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// PID recorded in an existing lock file; `None` if unreadable.
    fn holder(lock_path: &Path) -> Option<u32> {
        fs::read_to_string(lock_path).ok()?.trim().parse().ok()
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        // Only count it as running if /proc says it is one of ours
        fs::read_to_string(format!("/proc/{pid}/cmdline"))
            .map(|cmdline| cmdline.contains("plc-oee") || cmdline.contains("plc_oee"))
            .unwrap_or(false)
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        true
    }

    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                tracing::warn!(error = %e, "Failed to remove lock file");
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_acquire_writes_pid_and_releases_on_drop() {
        let temp_dir = tempdir().unwrap();
        let lock_path;
        {
            let lock = ProcessLock::acquire(temp_dir.path().join("data")).unwrap();
            lock_path = lock.path().to_path_buf();
            let pid: u32 = fs::read_to_string(&lock_path).unwrap().trim().parse().unwrap();
            assert_eq!(pid, std::process::id());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn test_stale_and_garbage_locks_are_replaced() {
        let temp_dir = tempdir().unwrap();
        let lock_path = temp_dir.path().join(LOCK_FILE_NAME);

        fs::write(&lock_path, "999999999\n").unwrap();
        drop(ProcessLock::acquire(temp_dir.path()).unwrap());

        fs::write(&lock_path, "not a pid").unwrap();
        let lock = ProcessLock::acquire(temp_dir.path()).unwrap();
        assert!(lock.path().exists());
    }
}
