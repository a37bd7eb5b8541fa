//! Configuration for a hostboot run.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (HOSTBOOT_STATE_DIR, HOSTBOOT_SECRETS_DIR)
//! 2. Config file
//! 3. Defaults
//!
//! Config file discovery:
//! - `--config <path>` on the command line
//! - HOSTBOOT_CONFIG
//! - /etc/hostboot/config.yaml
//!
//! Relative paths in the config file resolve against the file's directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::adapters::DEFAULT_ZONE_ENDPOINT;
use crate::domain::{Group, Principal, ServerPrincipal, SudoRule};

/// Config file used when neither the flag nor HOSTBOOT_CONFIG is set
pub const DEFAULT_CONFIG_PATH: &str = "/etc/hostboot/config.yaml";

pub const CONFIG_ENV: &str = "HOSTBOOT_CONFIG";
pub const STATE_DIR_ENV: &str = "HOSTBOOT_STATE_DIR";
pub const SECRETS_DIR_ENV: &str = "HOSTBOOT_SECRETS_DIR";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub metadata: MetadataConfig,
    pub package: PackageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub organization: OrganizationConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Sentinels, journal and run lock
    pub state_dir: Option<String>,
    /// Server principal passwords and identity keys
    pub secrets_dir: Option<String>,
    /// Drop-in directory for sudo rules
    pub sudoers_dir: Option<String>,
    /// Platform detection source
    pub os_release: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default = "default_zone_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_metadata_timeout")]
    pub timeout_seconds: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            endpoint: default_zone_endpoint(),
            timeout_seconds: default_metadata_timeout(),
        }
    }
}

fn default_zone_endpoint() -> String {
    DEFAULT_ZONE_ENDPOINT.to_string()
}

fn default_metadata_timeout() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Where to download the server package from
    pub url: String,
    /// Local path of the downloaded package
    #[serde(default = "default_package_path")]
    pub path: String,
    /// Expected SHA-256 of the package (hex)
    #[serde(default)]
    pub sha256: Option<String>,
    /// Installer argv; the package path is appended
    #[serde(default = "default_install_command")]
    pub install_command: Vec<String>,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_seconds: u64,
}

fn default_package_path() -> String {
    "/tmp/chef-server.deb".to_string()
}

fn default_install_command() -> Vec<String> {
    vec!["dpkg".to_string(), "-i".to_string()]
}

fn default_fetch_timeout() -> u64 {
    600
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server control executable
    #[serde(default = "default_ctl")]
    pub ctl: String,
    /// How many times to run `reconfigure`; the first pass can lose a
    /// startup race with the bundled web frontend
    #[serde(default = "default_reconfigure_passes")]
    pub reconfigure_passes: u32,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ctl: default_ctl(),
            reconfigure_passes: default_reconfigure_passes(),
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

fn default_ctl() -> String {
    "chef-server-ctl".to_string()
}

fn default_reconfigure_passes() -> u32 {
    2
}

fn default_command_timeout() -> u64 {
    900
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationConfig {
    /// Short name
    pub name: String,
    /// Display name
    pub full_name: String,
    /// Server principal associated with the organization
    pub admin: ServerPrincipal,
    /// Additional server principals
    #[serde(default)]
    pub users: Vec<ServerPrincipal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountsConfig {
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub users: Vec<Principal>,
    #[serde(default)]
    pub admin_group: Option<Group>,
    /// Cloud image account to lock; derived from the platform when unset
    #[serde(default)]
    pub default_account: Option<String>,
    #[serde(default = "default_true")]
    pub lock_default_account: bool,
    #[serde(default)]
    pub sudo: Option<SudoRule>,
}

impl Default for AccountsConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            users: Vec::new(),
            admin_group: None,
            default_account: None,
            lock_default_account: true,
            sudo: None,
        }
    }
}

impl AccountsConfig {
    /// Fold each account's `groups` into the managed group's member list
    fn merge_group_membership(&mut self) -> Result<()> {
        for user in &self.users {
            for group in &user.groups {
                match self.admin_group.as_mut() {
                    Some(admin) if &admin.name == group => {
                        if !admin.members.contains(&user.login) {
                            admin.members.push(user.login.clone());
                        }
                    }
                    _ => anyhow::bail!(
                        "Account '{}' lists group '{}', which is not managed",
                        user.login,
                        group
                    ),
                }
            }
        }
        Ok(())
    }
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

fn default_true() -> bool {
    true
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    /// Path to the config file this was loaded from
    pub config_file: PathBuf,
    pub state_dir: PathBuf,
    pub secrets_dir: PathBuf,
    pub sudoers_dir: PathBuf,
    pub os_release: PathBuf,
    pub metadata: MetadataConfig,
    pub package: PackageConfig,
    pub server: ServerConfig,
    pub organization: OrganizationConfig,
    pub accounts: AccountsConfig,
}

impl ResolvedConfig {
    pub fn sentinel_dir(&self) -> PathBuf {
        self.state_dir.join("sentinels")
    }

    pub fn journal_path(&self) -> PathBuf {
        self.state_dir.join("journal.jsonl")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("run.lock")
    }

    /// Package path with relative values resolved against the config file
    pub fn package_path(&self) -> PathBuf {
        resolve_path(self.config_dir(), &self.package.path)
    }

    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata.timeout_seconds)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.package.fetch_timeout_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.server.command_timeout_seconds)
    }

    fn config_dir(&self) -> &Path {
        self.config_file.parent().unwrap_or(Path::new("/"))
    }

    /// Check invariants serde cannot express
    pub fn validate(&self) -> Result<()> {
        let org = &self.organization;
        if org.name.trim().is_empty() {
            anyhow::bail!("organization.name cannot be empty");
        }
        if org.admin.login.trim().is_empty() {
            anyhow::bail!("organization.admin.login cannot be empty");
        }

        let mut server_logins = HashSet::new();
        for principal in std::iter::once(&org.admin).chain(org.users.iter()) {
            validate_login(&principal.login)
                .with_context(|| "Invalid server principal in organization")?;
            if !server_logins.insert(principal.login.as_str()) {
                anyhow::bail!("Duplicate server principal '{}'", principal.login);
            }
        }

        let mut os_logins = HashSet::new();
        for user in &self.accounts.users {
            validate_login(&user.login).with_context(|| "Invalid entry in accounts.users")?;
            if !os_logins.insert(user.login.as_str()) {
                anyhow::bail!("Duplicate account '{}'", user.login);
            }
        }

        if let Some(group) = &self.accounts.admin_group {
            validate_login(&group.name).with_context(|| "Invalid accounts.admin_group")?;
            for member in &group.members {
                if !os_logins.contains(member.as_str()) {
                    // May be an account that already exists on the image
                    warn!(group = %group.name, member = %member, "Group member is not a provisioned account");
                }
            }
        }

        if let Some(rule) = &self.accounts.sudo {
            validate_login(&rule.group).with_context(|| "Invalid accounts.sudo.group")?;
            for default in &rule.defaults {
                if default.contains(|c: char| c == '\n' || c == '\r') {
                    anyhow::bail!("accounts.sudo.defaults entries must be a single line");
                }
            }
        }

        for (key, seconds) in [
            ("metadata.timeout_seconds", self.metadata.timeout_seconds),
            ("package.fetch_timeout_seconds", self.package.fetch_timeout_seconds),
            ("server.command_timeout_seconds", self.server.command_timeout_seconds),
        ] {
            if seconds == 0 {
                anyhow::bail!("{} must be at least 1", key);
            }
        }

        if self.server.reconfigure_passes == 0 {
            anyhow::bail!("server.reconfigure_passes must be at least 1");
        }
        if self.package.install_command.is_empty() {
            anyhow::bail!("package.install_command cannot be empty");
        }

        Ok(())
    }
}

/// OS and server login names share the portable username charset
fn validate_login(login: &str) -> Result<()> {
    let mut chars = login.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
        }
        None => false,
    };
    if !valid {
        anyhow::bail!("'{}' is not a valid login name", login);
    }
    Ok(())
}

/// Pick the config file: explicit flag, then HOSTBOOT_CONFIG, then the default
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    std::env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// Combine file values, environment overrides and defaults
fn resolve(
    config_file: PathBuf,
    raw: ConfigFile,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ResolvedConfig> {
    let config_file = if config_file.is_absolute() {
        config_file
    } else {
        std::env::current_dir()
            .context("Failed to determine current directory")?
            .join(config_file)
    };
    let base = config_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    let pick = |env_key: Option<&str>, value: &Option<String>, default: &str| -> PathBuf {
        if let Some(from_env) = env_key.and_then(&env) {
            return PathBuf::from(from_env);
        }
        match value {
            Some(v) => resolve_path(&base, v),
            None => PathBuf::from(default),
        }
    };

    let state_dir = pick(Some(STATE_DIR_ENV), &raw.paths.state_dir, "/var/lib/hostboot");
    let secrets_dir = pick(Some(SECRETS_DIR_ENV), &raw.paths.secrets_dir, "/root");
    let sudoers_dir = pick(None, &raw.paths.sudoers_dir, "/etc/sudoers.d");
    let os_release = pick(None, &raw.paths.os_release, "/etc/os-release");

    let mut accounts = raw.accounts;
    accounts.merge_group_membership()?;

    let resolved = ResolvedConfig {
        config_file,
        state_dir,
        secrets_dir,
        sudoers_dir,
        os_release,
        metadata: raw.metadata,
        package: raw.package,
        server: raw.server,
        organization: raw.organization,
        accounts,
    };
    resolved.validate()?;
    Ok(resolved)
}

/// Load configuration from all sources
pub fn load_config(explicit: Option<&Path>) -> Result<ResolvedConfig> {
    let path = config_path(explicit);
    let raw = load_config_file(&path)?;
    resolve(path, raw, |key| std::env::var(key).ok())
        .with_context(|| "Invalid configuration".to_string())
}
