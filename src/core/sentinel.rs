//! Durable completion markers, one file per step.
//!
//! A sentinel is `<dir>/<key>.done` with mode 0000. Presence is the only
//! thing that matters; the JSON body exists for operators inspecting a host.
//! Markers are written to a temp file in the same directory and renamed into
//! place, so a crash mid-write never leaves a file that reads as "done".

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::io::atomic_write;

const SENTINEL_EXTENSION: &str = "done";

/// Errors from sentinel I/O. None of these mean "step not done".
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("invalid sentinel key '{0}': must be lowercase alphanumeric, '-' or '_'")]
    InvalidKey(String),

    #[error("failed to check sentinel {path}: {source}")]
    Check {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write sentinel {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to remove sentinel {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Diagnostic body of a sentinel file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelRecord {
    pub step: String,
    pub run_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

/// File-backed sentinel store
#[derive(Debug, Clone)]
pub struct SentinelStore {
    dir: PathBuf,
}

impl SentinelStore {
    /// Open a store rooted at `dir`. The directory is created on first `mark`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the marker for `key`
    pub fn path_for(&self, key: &str) -> Result<PathBuf, SentinelError> {
        validate_key(key)?;
        Ok(self.dir.join(format!("{}.{}", key, SENTINEL_EXTENSION)))
    }

    /// Whether the sentinel for `key` exists.
    ///
    /// Only `NotFound` maps to `false`; permission or other filesystem errors
    /// are returned so they cannot be mistaken for "not yet done".
    pub fn exists(&self, key: &str) -> Result<bool, SentinelError> {
        let path = self.path_for(key)?;
        match fs::symlink_metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SentinelError::Check { path, source }),
        }
    }

    /// Record completion of `key` atomically.
    pub fn mark(&self, key: &str, run_id: Uuid) -> Result<(), SentinelError> {
        let path = self.path_for(key)?;
        let write_err = |source: io::Error| SentinelError::Write {
            path: path.clone(),
            source,
        };

        let record = SentinelRecord {
            step: key.to_string(),
            run_id,
            completed_at: Utc::now(),
        };
        let body = serde_json::to_vec(&record).map_err(|e| write_err(e.into()))?;
        atomic_write(&path, &body, 0o000).map_err(write_err)?;

        Ok(())
    }

    /// Remove the sentinel for `key`. Operator reset only; the pipeline never
    /// calls this. Returns whether a sentinel was present.
    pub fn clear(&self, key: &str) -> Result<bool, SentinelError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(SentinelError::Remove { path, source }),
        }
    }

    /// Keys of all sentinels currently present, sorted
    pub fn list(&self) -> Result<Vec<String>, SentinelError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(SentinelError::Check {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| SentinelError::Check {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SENTINEL_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_key(stem).is_ok() {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Keys become file names, so they are restricted to a safe charset.
pub fn validate_key(key: &str) -> Result<(), SentinelError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SentinelError::InvalidKey(key.to_string()))
    }
}
