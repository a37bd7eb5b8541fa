//! Resolution of host environment facts.
//!
//! The probe performs a single metadata lookup per process. The result is
//! kept for the remainder of the run; nothing re-resolves.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::adapters::{MetadataSource, ProbeError};
use crate::domain::{EnvironmentFacts, Platform};

/// Resolves zone, region and platform exactly once
pub struct EnvironmentProbe {
    source: Arc<dyn MetadataSource>,
    os_release: PathBuf,
    facts: OnceCell<EnvironmentFacts>,
}

impl EnvironmentProbe {
    pub fn new(source: Arc<dyn MetadataSource>, os_release: impl Into<PathBuf>) -> Self {
        Self {
            source,
            os_release: os_release.into(),
            facts: OnceCell::new(),
        }
    }

    /// Resolve facts, performing the external lookup on first call only.
    ///
    /// A failed lookup is not cached. The pipeline treats it as fatal and
    /// never asks again.
    #[instrument(skip(self))]
    pub async fn resolve(&self) -> Result<&EnvironmentFacts, ProbeError> {
        self.facts
            .get_or_try_init(|| async {
                let platform = self.detect_platform().await?;
                let raw_zone = self.source.availability_zone().await?;
                let facts = EnvironmentFacts::new(&raw_zone, platform)?;
                info!(
                    zone = %facts.zone,
                    region = %facts.region,
                    platform = %facts.platform,
                    "Environment resolved"
                );
                Ok(facts)
            })
            .await
    }

    /// Facts if already resolved
    pub fn cached(&self) -> Option<&EnvironmentFacts> {
        self.facts.get()
    }

    async fn detect_platform(&self) -> Result<Platform, ProbeError> {
        match tokio::fs::read_to_string(&self.os_release).await {
            Ok(content) => Ok(Platform::from_os_release(&content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(path = %self.os_release.display(), "os-release not found, platform unknown");
                Ok(Platform::Unknown)
            }
            Err(source) => Err(ProbeError::OsRelease {
                path: self.os_release.display().to_string(),
                source,
            }),
        }
    }
}
