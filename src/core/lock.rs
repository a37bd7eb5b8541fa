//! Host-scoped exclusive lock for the duration of a run.
//!
//! Two concurrent invocations would race on sentinels and secret files, so
//! the second one fails immediately instead of waiting.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another hostboot run holds {path} (pid {holder})")]
    Held { path: PathBuf, holder: String },

    #[error("failed to open lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Exclusive lock guard; released when dropped
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without blocking.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let io_err = |source: io::Error| LockError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_err)?;

        if let Err(e) = file.try_lock_exclusive() {
            if e.kind() == fs2::lock_contended_error().kind() {
                let holder = std::fs::read_to_string(path)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                return Err(LockError::Held {
                    path: path.to_path_buf(),
                    holder: if holder.is_empty() {
                        "unknown".to_string()
                    } else {
                        holder
                    },
                });
            }
            return Err(io_err(e));
        }

        // Record our pid for whoever finds the lock held
        file.set_len(0).map_err(io_err)?;
        write!(file, "{}", std::process::id()).map_err(io_err)?;
        file.flush().map_err(io_err)?;

        debug!(path = %path.display(), "Run lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        debug!(path = %self.path.display(), "Run lock released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_while_held() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run.lock");

        let first = RunLock::acquire(&path).unwrap();
        let second = RunLock::acquire(&path);
        match second {
            Err(LockError::Held { holder, .. }) => {
                assert_eq!(holder, std::process::id().to_string())
            }
            other => panic!("expected Held, got {:?}", other),
        }

        drop(first);
        assert!(RunLock::acquire(&path).is_ok());
    }
}
