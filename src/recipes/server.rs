//! Configuration-server steps: package, reconfigure, organization.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::adapters::{ArtifactFetcher, Command, CommandRunner, FetchOutcome};
use crate::config::OrganizationConfig;
use crate::core::io::path_exists;
use crate::core::secrets::{restrict_to_owner, Secret};
use crate::core::{StepAction, StepContext};
use crate::domain::ServerPrincipal;

/// Download the server package unless it is already on disk
pub struct FetchPackage {
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub url: String,
    pub path: PathBuf,
    pub sha256: Option<String>,
}

#[async_trait]
impl StepAction for FetchPackage {
    async fn execute(&self, _ctx: &StepContext<'_>) -> Result<()> {
        let outcome = self
            .fetcher
            .fetch(&self.url, &self.path, self.sha256.as_deref())
            .await?;
        if outcome == FetchOutcome::AlreadyPresent {
            info!(path = %self.path.display(), "Using package already on disk");
        }
        Ok(())
    }
}

/// Install the downloaded package with the configured installer
pub struct InstallPackage {
    pub runner: Arc<dyn CommandRunner>,
    pub install_command: Vec<String>,
    pub path: PathBuf,
    pub timeout: Duration,
}

#[async_trait]
impl StepAction for InstallPackage {
    async fn execute(&self, _ctx: &StepContext<'_>) -> Result<()> {
        let (program, args) = self
            .install_command
            .split_first()
            .context("Installer command is empty")?;
        let command = Command::new(program)
            .args(args.iter().map(String::as_str))
            .arg(self.path.to_string_lossy());

        self.runner.run_checked(&command, self.timeout).await?;
        Ok(())
    }
}

/// Run the server's reconfigure pass, possibly several times
pub struct ConfigureServer {
    pub runner: Arc<dyn CommandRunner>,
    pub ctl: String,
    pub passes: u32,
    pub timeout: Duration,
}

#[async_trait]
impl StepAction for ConfigureServer {
    async fn execute(&self, _ctx: &StepContext<'_>) -> Result<()> {
        let command = Command::new(&self.ctl).arg("reconfigure");
        for pass in 1..=self.passes {
            info!(pass, of = self.passes, "Reconfiguring server");
            self.runner
                .run_checked(&command, self.timeout)
                .await
                .with_context(|| format!("Reconfigure pass {} of {} failed", pass, self.passes))?;
        }
        Ok(())
    }
}

/// Create server principals and the organization they administer.
///
/// Each principal gets a generated password (backed up to
/// `<secrets_dir>/<login>.password`) and an identity key written by the
/// server CLI to `<secrets_dir>/<login>.pem`.
pub struct CreateOrganization {
    pub runner: Arc<dyn CommandRunner>,
    pub ctl: String,
    pub organization: OrganizationConfig,
    pub secrets_dir: PathBuf,
    pub timeout: Duration,
}

impl CreateOrganization {
    pub fn password_path(&self, login: &str) -> PathBuf {
        self.secrets_dir.join(format!("{}.password", login))
    }

    pub fn identity_path(&self, login: &str) -> PathBuf {
        self.secrets_dir.join(format!("{}.pem", login))
    }

    pub fn validator_path(&self) -> PathBuf {
        self.secrets_dir
            .join(format!("{}-validator.pem", self.organization.name))
    }

    /// Exit status 0 from a `*-show` subcommand means the object exists
    async fn exists(&self, subcommand: &str, name: &str) -> Result<bool> {
        let command = Command::new(&self.ctl).arg(subcommand).arg(name);
        let output = self.runner.run(&command, self.timeout).await?;
        Ok(output.success())
    }

    async fn ensure_principal(
        &self,
        ctx: &StepContext<'_>,
        principal: &ServerPrincipal,
    ) -> Result<()> {
        let password_path = self.password_path(&principal.login);
        let identity_path = self.identity_path(&principal.login);

        if self.exists("user-show", &principal.login).await? {
            let has_backup = path_exists(&password_path)
                .with_context(|| format!("Failed to stat {}", password_path.display()))?;
            if !has_backup {
                warn!(
                    login = %principal.login,
                    path = %password_path.display(),
                    "Server principal exists but its password backup is missing"
                );
            }
            let has_identity = path_exists(&identity_path)
                .with_context(|| format!("Failed to stat {}", identity_path.display()))?;
            if has_identity {
                restrict_to_owner(&identity_path)?;
            }
            info!(login = %principal.login, "Server principal already exists");
            return Ok(());
        }

        // Reuse the password of an interrupted attempt so the backup on disk
        // always matches what the server was given.
        let secret = match Secret::read_backup(&principal.login, &password_path)? {
            Some(secret) => {
                info!(login = %principal.login, fingerprint = %secret.fingerprint, "Reusing backed-up password");
                secret
            }
            None => {
                let secret = ctx.secrets.generate(&principal.login)?;
                secret.write_backup(&password_path)?;
                secret
            }
        };

        let command = Command::new(&self.ctl)
            .arg("user-create")
            .arg(&principal.login)
            .arg(&principal.first_name)
            .arg(&principal.last_name)
            .arg(&principal.email)
            .secret_arg(&secret.value)
            .arg("--filename")
            .arg(identity_path.to_string_lossy());
        self.runner.run_checked(&command, self.timeout).await?;

        secure_written_key(&identity_path)?;
        info!(
            login = %principal.login,
            fingerprint = %secret.fingerprint,
            "Server principal created"
        );
        Ok(())
    }

    async fn ensure_organization(&self) -> Result<()> {
        let org = &self.organization;
        if self.exists("org-show", &org.name).await? {
            info!(org = %org.name, "Organization already exists");
            return Ok(());
        }

        let validator = self.validator_path();
        let command = Command::new(&self.ctl)
            .arg("org-create")
            .arg(&org.name)
            .arg(&org.full_name)
            .arg("--association_user")
            .arg(&org.admin.login)
            .arg("--filename")
            .arg(validator.to_string_lossy());
        self.runner.run_checked(&command, self.timeout).await?;

        secure_written_key(&validator)?;
        info!(org = %org.name, admin = %org.admin.login, "Organization created");
        Ok(())
    }
}

#[async_trait]
impl StepAction for CreateOrganization {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<()> {
        std::fs::create_dir_all(&self.secrets_dir)
            .with_context(|| format!("Failed to create {}", self.secrets_dir.display()))?;

        let principals =
            std::iter::once(&self.organization.admin).chain(self.organization.users.iter());
        for principal in principals {
            self.ensure_principal(ctx, principal)
                .await
                .with_context(|| format!("Failed to create server principal '{}'", principal.login))?;
        }

        self.ensure_organization()
            .await
            .with_context(|| format!("Failed to create organization '{}'", self.organization.name))
    }
}

/// Key files are written by the server CLI with its own umask
fn secure_written_key(path: &Path) -> Result<()> {
    let written =
        path_exists(path).with_context(|| format!("Failed to stat {}", path.display()))?;
    if !written {
        anyhow::bail!("Expected key file {} was not written", path.display());
    }
    restrict_to_owner(path)?;
    Ok(())
}
