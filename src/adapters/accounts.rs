//! OS account, group and sudo management through the standard shadow-utils.
//!
//! Every operation checks current state first (`getent`) so it can be re-run
//! after a partial failure without tripping over "already exists".

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use super::command::{Command, CommandRunner};
use crate::core::io::atomic_write;
use crate::domain::{Group, Principal, SudoRule};

/// `getent` exit code for "key not found in database"
const GETENT_NOT_FOUND: i32 = 2;

/// Whether an account was created or updated in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserChange {
    Created,
    Updated,
}

/// OS-level account management
#[async_trait]
pub trait AccountManager: Send + Sync {
    /// Create the account if missing, otherwise update its comment.
    /// A non-empty key list replaces the account's authorized_keys.
    async fn ensure_user(&self, principal: &Principal) -> Result<UserChange>;

    /// Lock password and expire the account. Returns false if it does not exist.
    async fn lock_user(&self, login: &str) -> Result<bool>;

    /// Create the group if missing and set its members to exactly the given list
    async fn replace_group(&self, group: &Group) -> Result<()>;

    /// Validate and install a sudoers drop-in for the rule
    async fn install_sudo_rule(&self, rule: &SudoRule) -> Result<PathBuf>;
}

/// Account manager backed by useradd/usermod/groupadd/gpasswd/visudo
pub struct SystemAccounts {
    runner: Arc<dyn CommandRunner>,
    sudoers_dir: PathBuf,
    shell: String,
    timeout: Duration,
}

impl SystemAccounts {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        sudoers_dir: impl Into<PathBuf>,
        shell: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            sudoers_dir: sudoers_dir.into(),
            shell: shell.into(),
            timeout,
        }
    }

    /// Look up a passwd entry; returns the home directory if the user exists
    async fn user_home(&self, login: &str) -> Result<Option<PathBuf>> {
        let command = Command::new("getent").args(["passwd", login]);
        let output = self.runner.run(&command, self.timeout).await?;

        match output.code {
            Some(0) => {
                let home = output
                    .stdout
                    .lines()
                    .next()
                    .and_then(|line| line.split(':').nth(5))
                    .filter(|home| !home.is_empty())
                    .with_context(|| format!("Malformed passwd entry for '{}'", login))?;
                Ok(Some(PathBuf::from(home)))
            }
            Some(GETENT_NOT_FOUND) => Ok(None),
            code => anyhow::bail!(
                "'{}' failed with exit code {:?}: {}",
                command,
                code,
                output.stderr.trim()
            ),
        }
    }

    async fn group_exists(&self, name: &str) -> Result<bool> {
        let command = Command::new("getent").args(["group", name]);
        let output = self.runner.run(&command, self.timeout).await?;
        match output.code {
            Some(0) => Ok(true),
            Some(GETENT_NOT_FOUND) => Ok(false),
            code => anyhow::bail!(
                "'{}' failed with exit code {:?}: {}",
                command,
                code,
                output.stderr.trim()
            ),
        }
    }

    async fn write_authorized_keys(&self, principal: &Principal, home: &Path) -> Result<()> {
        let ssh_dir = home.join(".ssh");
        let keys_path = ssh_dir.join("authorized_keys");

        std::fs::create_dir_all(&ssh_dir)
            .with_context(|| format!("Failed to create {}", ssh_dir.display()))?;
        set_mode(&ssh_dir, 0o700)?;
        atomic_write(&keys_path, principal.authorized_keys().as_bytes(), 0o600)
            .with_context(|| format!("Failed to write {}", keys_path.display()))?;

        let owner = format!("{}:", principal.login);
        let chown = Command::new("chown")
            .arg("-R")
            .arg(owner)
            .arg(ssh_dir.to_string_lossy());
        self.runner.run_checked(&chown, self.timeout).await?;

        debug!(
            login = %principal.login,
            keys = principal.ssh_keys.len(),
            "Authorized keys written"
        );
        Ok(())
    }
}

#[async_trait]
impl AccountManager for SystemAccounts {
    async fn ensure_user(&self, principal: &Principal) -> Result<UserChange> {
        let (change, home) = match self.user_home(&principal.login).await? {
            Some(home) => {
                let usermod = Command::new("usermod")
                    .arg("--comment")
                    .arg(principal.comment())
                    .arg(&principal.login);
                self.runner.run_checked(&usermod, self.timeout).await?;
                (UserChange::Updated, home)
            }
            None => {
                let useradd = Command::new("useradd")
                    .arg("--create-home")
                    .args(["--shell", self.shell.as_str()])
                    .arg("--comment")
                    .arg(principal.comment())
                    .arg(&principal.login);
                self.runner.run_checked(&useradd, self.timeout).await?;
                let home = self
                    .user_home(&principal.login)
                    .await?
                    .with_context(|| format!("User '{}' missing after useradd", principal.login))?;
                (UserChange::Created, home)
            }
        };

        if !principal.ssh_keys.is_empty() {
            self.write_authorized_keys(principal, &home).await?;
        }

        info!(login = %principal.login, ?change, "Account provisioned");
        Ok(change)
    }

    async fn lock_user(&self, login: &str) -> Result<bool> {
        if self.user_home(login).await?.is_none() {
            warn!(login, "Account to lock does not exist, nothing to do");
            return Ok(false);
        }

        let usermod = Command::new("usermod")
            .args(["--lock", "--expiredate", "1"])
            .arg(login);
        self.runner.run_checked(&usermod, self.timeout).await?;

        info!(login, "Account locked");
        Ok(true)
    }

    async fn replace_group(&self, group: &Group) -> Result<()> {
        if !self.group_exists(&group.name).await? {
            let groupadd = Command::new("groupadd").arg(&group.name);
            self.runner.run_checked(&groupadd, self.timeout).await?;
        }

        let gpasswd = Command::new("gpasswd")
            .arg("-M")
            .arg(group.members.join(","))
            .arg(&group.name);
        self.runner.run_checked(&gpasswd, self.timeout).await?;

        info!(group = %group.name, members = ?group.members, "Group membership set");
        Ok(())
    }

    async fn install_sudo_rule(&self, rule: &SudoRule) -> Result<PathBuf> {
        validate_sudoers_name(&rule.name)?;
        let dest = self.sudoers_dir.join(&rule.name);

        std::fs::create_dir_all(&self.sudoers_dir)
            .with_context(|| format!("Failed to create {}", self.sudoers_dir.display()))?;

        // Stage the rendered rule under a dotted temp name, which sudo ignores
        // when scanning the drop-in directory, and validate it before install.
        let mut staged = NamedTempFile::new_in(&self.sudoers_dir)
            .context("Failed to stage sudoers rule")?;
        std::io::Write::write_all(&mut staged, rule.render().as_bytes())
            .context("Failed to stage sudoers rule")?;
        set_mode(staged.path(), 0o440)?;

        let visudo = Command::new("visudo")
            .arg("-cf")
            .arg(staged.path().to_string_lossy());
        self.runner
            .run_checked(&visudo, self.timeout)
            .await
            .with_context(|| format!("Sudoers rule '{}' failed validation", rule.name))?;

        staged
            .persist(&dest)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to install {}", dest.display()))?;

        info!(rule = %rule.name, group = %rule.group, path = %dest.display(), "Sudo rule installed");
        Ok(dest)
    }
}

/// sudo skips drop-in files whose names contain '.' or end in '~'
fn validate_sudoers_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        anyhow::bail!(
            "Invalid sudo rule name '{}': use letters, digits, '-' or '_'",
            name
        );
    }
    Ok(())
}

fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to set mode {:o} on {}", mode, path.display()))
}
