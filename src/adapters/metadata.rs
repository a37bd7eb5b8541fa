//! Cloud instance metadata client.
//!
//! Endpoint: GET http://169.254.169.254/latest/meta-data/placement/availability-zone
//! Response: plaintext zone name

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ZoneError;

/// Default link-local endpoint for the placement zone
pub const DEFAULT_ZONE_ENDPOINT: &str =
    "http://169.254.169.254/latest/meta-data/placement/availability-zone";

/// Failures resolving environment facts. All are fatal before any step runs.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("metadata endpoint {endpoint} unreachable: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("metadata endpoint {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("metadata endpoint {endpoint} returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    #[error("malformed availability zone: {0}")]
    Malformed(#[from] ZoneError),

    #[error("failed to read {path}: {source}")]
    OsRelease {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Source of the raw placement zone
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch the raw availability-zone string
    async fn availability_zone(&self) -> Result<String, ProbeError>;
}

/// HTTP metadata client (one GET, no retry)
pub struct HttpMetadataClient {
    endpoint: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpMetadataClient {
    /// Create a new client for `endpoint` bounded by `timeout`
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataSource for HttpMetadataClient {
    async fn availability_zone(&self) -> Result<String, ProbeError> {
        let response = self
            .client
            .get(&self.endpoint)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| self.transport_error(e))
    }
}

impl HttpMetadataClient {
    fn transport_error(&self, source: reqwest::Error) -> ProbeError {
        if source.is_timeout() {
            ProbeError::Timeout {
                endpoint: self.endpoint.clone(),
                after: self.timeout,
            }
        } else {
            ProbeError::Unreachable {
                endpoint: self.endpoint.clone(),
                source,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_fails() {
        // Port 9 on loopback: nothing listens, connection is refused quickly
        let client = HttpMetadataClient::new("http://127.0.0.1:9/zone", Duration::from_secs(2));
        let result = client.availability_zone().await;
        assert!(matches!(
            result,
            Err(ProbeError::Unreachable { .. })
                | Err(ProbeError::Timeout { .. })
                | Err(ProbeError::Status { .. })
        ));
    }

    #[test]
    fn test_default_endpoint() {
        let client = HttpMetadataClient::new(DEFAULT_ZONE_ENDPOINT, Duration::from_secs(1));
        assert!(client.endpoint().starts_with("http://169.254.169.254/"));
    }
}
