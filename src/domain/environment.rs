//! Host environment facts resolved once per run.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Facts about the host that steps may depend on.
///
/// Resolved exactly once, before any step runs, and handed to each step by
/// reference. Nothing mutates it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentFacts {
    /// Placement availability zone, e.g. `us-east-1a`
    pub zone: String,

    /// Region derived from the zone, e.g. `us-east-1`
    pub region: String,

    /// Operating system family of this host
    pub platform: Platform,
}

impl EnvironmentFacts {
    /// Build facts from a raw zone string and a detected platform.
    pub fn new(raw_zone: &str, platform: Platform) -> Result<Self, ZoneError> {
        let zone = raw_zone.trim();
        let region = region_from_zone(zone)?.to_string();
        Ok(Self {
            zone: zone.to_string(),
            region,
            platform,
        })
    }

    /// Facts as key/value pairs, in a stable order
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("zone", self.zone.clone()),
            ("region", self.region.clone()),
            ("platform", self.platform.to_string()),
        ]
    }

    /// Look up a single fact by key
    pub fn get(&self, key: &str) -> Option<String> {
        self.pairs()
            .into_iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }
}

/// A zone string that cannot yield a region
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ZoneError {
    #[error("availability zone is empty")]
    Empty,

    #[error("availability zone '{0}' contains whitespace")]
    Whitespace(String),

    #[error("availability zone '{0}' does not end in a zone letter")]
    NoZoneLetter(String),

    #[error("availability zone '{0}' has no region prefix")]
    NoRegion(String),
}

/// Derive the region by stripping exactly one trailing zone letter.
///
/// `us-east-1a` becomes `us-east-1`. The remaining prefix must end in a digit,
/// which rejects truncated or garbled responses rather than guessing.
pub fn region_from_zone(zone: &str) -> Result<&str, ZoneError> {
    if zone.is_empty() {
        return Err(ZoneError::Empty);
    }
    if zone.chars().any(char::is_whitespace) {
        return Err(ZoneError::Whitespace(zone.to_string()));
    }

    let last = zone.chars().last().ok_or(ZoneError::Empty)?;
    if !last.is_ascii_lowercase() {
        return Err(ZoneError::NoZoneLetter(zone.to_string()));
    }

    let region = &zone[..zone.len() - last.len_utf8()];
    match region.chars().last() {
        Some(c) if c.is_ascii_digit() => Ok(region),
        _ => Err(ZoneError::NoRegion(zone.to_string())),
    }
}

/// Operating system family, as reported by os-release
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Ubuntu,
    Debian,
    Centos,
    Rhel,
    Amazon,
    Unknown,
}

impl Platform {
    /// Parse the contents of an os-release file.
    ///
    /// `ID` wins; `ID_LIKE` is consulted when `ID` is not recognised.
    pub fn from_os_release(content: &str) -> Self {
        let mut id = None;
        let mut id_like = None;

        for line in content.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').trim_matches('\'');
            match key.trim() {
                "ID" => id = Some(value.to_ascii_lowercase()),
                "ID_LIKE" => id_like = Some(value.to_ascii_lowercase()),
                _ => {}
            }
        }

        if let Some(platform) = id.as_deref().and_then(Self::from_id) {
            return platform;
        }

        id_like
            .as_deref()
            .and_then(|like| like.split_whitespace().find_map(Self::from_id))
            .unwrap_or(Platform::Unknown)
    }

    fn from_id(id: &str) -> Option<Self> {
        match id {
            "ubuntu" => Some(Platform::Ubuntu),
            "debian" => Some(Platform::Debian),
            "centos" => Some(Platform::Centos),
            "rhel" | "redhat" | "fedora" => Some(Platform::Rhel),
            "amzn" | "amazon" => Some(Platform::Amazon),
            _ => None,
        }
    }

    /// The login of the stock cloud-image account on this platform
    pub fn default_cloud_account(self) -> Option<&'static str> {
        match self {
            Platform::Ubuntu | Platform::Debian => Some("ubuntu"),
            Platform::Centos | Platform::Rhel | Platform::Amazon => Some("ec2-user"),
            Platform::Unknown => None,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Platform::Ubuntu => "ubuntu",
            Platform::Debian => "debian",
            Platform::Centos => "centos",
            Platform::Rhel => "rhel",
            Platform::Amazon => "amazon",
            Platform::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
