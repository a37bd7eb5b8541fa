//! Package artifact download with create-if-missing semantics.
//!
//! The body is streamed into a temp file next to the destination and renamed
//! into place once complete and verified, so an interrupted or corrupt
//! download never occupies the destination path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::io::path_exists;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to download {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("download of {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    Checksum {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What a fetch did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The destination already existed
    AlreadyPresent,

    /// The artifact was downloaded
    Downloaded,
}

/// Retrieves an artifact from a URL to a local path
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url` to `dest` unless `dest` already exists.
    ///
    /// When `sha256` is given, a pre-existing file that does not match it is
    /// removed and downloaded again, and a downloaded body that does not
    /// match it never reaches `dest`.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        sha256: Option<&str>,
    ) -> Result<FetchOutcome, FetchError>;
}

/// Downloads over HTTP(S) with an overall timeout
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self::with_client(reqwest::Client::new(), timeout)
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Stream `url` into a temp file next to `dest`, hashing as it arrives.
    ///
    /// The temp file is renamed into place only if the digest matches, so a
    /// bad body never occupies `dest`.
    async fn download(
        &self,
        url: &str,
        dest: &Path,
        sha256: Option<&str>,
    ) -> Result<(), FetchError> {
        let transport = |source: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            source,
        };
        let io_err = |source: std::io::Error| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        };

        let mut response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let dir = dest.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir).map_err(io_err)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;

        let mut hasher = Sha256::new();
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            tmp.write_all(&chunk).map_err(io_err)?;
            hasher.update(&chunk);
            written += chunk.len() as u64;
        }

        if let Some(expected) = sha256 {
            let actual = hex::encode(hasher.finalize());
            if !digest_matches(expected, &actual) {
                // Dropping the temp file removes it
                return Err(FetchError::Checksum {
                    path: dest.to_path_buf(),
                    expected: expected.trim().to_ascii_lowercase(),
                    actual,
                });
            }
        }

        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(dest).map_err(|e| io_err(e.error))?;

        debug!(url, bytes = written, "Download complete");
        Ok(())
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        sha256: Option<&str>,
    ) -> Result<FetchOutcome, FetchError> {
        let present = path_exists(dest).map_err(|source| FetchError::Io {
            path: dest.to_path_buf(),
            source,
        })?;

        if present {
            let Some(expected) = sha256 else {
                info!(path = %dest.display(), "Artifact already present, not downloading");
                return Ok(FetchOutcome::AlreadyPresent);
            };
            match verify_checksum(dest, expected) {
                Ok(()) => {
                    info!(path = %dest.display(), "Artifact already present, not downloading");
                    return Ok(FetchOutcome::AlreadyPresent);
                }
                Err(FetchError::Checksum { actual, .. }) => {
                    warn!(
                        path = %dest.display(),
                        %actual,
                        "Artifact on disk does not match checksum, downloading again"
                    );
                    std::fs::remove_file(dest).map_err(|source| FetchError::Io {
                        path: dest.to_path_buf(),
                        source,
                    })?;
                }
                Err(e) => return Err(e),
            }
        }

        info!(url, path = %dest.display(), "Downloading artifact");
        self.download(url, dest, sha256).await?;
        Ok(FetchOutcome::Downloaded)
    }
}

fn digest_matches(expected: &str, actual: &str) -> bool {
    actual.eq_ignore_ascii_case(expected.trim())
}

/// Compare the SHA-256 of the file at `path` against a hex digest
pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), FetchError> {
    let actual = hash_file(path)?;
    if digest_matches(expected, &actual) {
        Ok(())
    } else {
        Err(FetchError::Checksum {
            path: path.to_path_buf(),
            expected: expected.trim().to_ascii_lowercase(),
            actual,
        })
    }
}

/// Full SHA-256 of a file, hex encoded
pub fn hash_file(path: &Path) -> Result<String, FetchError> {
    let mut file = std::fs::File::open(path).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|source| FetchError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(hex::encode(hasher.finalize()))
}
