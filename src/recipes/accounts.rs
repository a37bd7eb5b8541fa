//! OS account steps.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::adapters::AccountManager;
use crate::core::{StepAction, StepContext};
use crate::domain::{Group, Principal, SudoRule};

pub struct ProvisionAccounts {
    pub accounts: Arc<dyn AccountManager>,
    pub users: Vec<Principal>,
}

#[async_trait]
impl StepAction for ProvisionAccounts {
    async fn execute(&self, _ctx: &StepContext<'_>) -> Result<()> {
        for user in &self.users {
            self.accounts
                .ensure_user(user)
                .await
                .with_context(|| format!("Failed to provision account '{}'", user.login))?;
        }
        Ok(())
    }
}

pub struct ReplaceGroup {
    pub accounts: Arc<dyn AccountManager>,
    pub group: Group,
}

#[async_trait]
impl StepAction for ReplaceGroup {
    async fn execute(&self, _ctx: &StepContext<'_>) -> Result<()> {
        self.accounts
            .replace_group(&self.group)
            .await
            .with_context(|| format!("Failed to set members of group '{}'", self.group.name))
    }
}

/// Lock the account shipped with the cloud image.
///
/// Uses the configured login, or the platform's conventional one. Unknown
/// platforms and absent accounts are logged and skipped.
pub struct LockDefaultAccount {
    pub accounts: Arc<dyn AccountManager>,
    pub login: Option<String>,
}

#[async_trait]
impl StepAction for LockDefaultAccount {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<()> {
        let login = match self.login.as_deref() {
            Some(login) => login,
            None => match ctx.facts.platform.default_cloud_account() {
                Some(login) => login,
                None => {
                    warn!(platform = %ctx.facts.platform, "No default cloud account known for platform");
                    return Ok(());
                }
            },
        };

        if self.accounts.lock_user(login).await? {
            info!(login, "Default cloud account locked");
        }
        Ok(())
    }
}

pub struct InstallSudoRule {
    pub accounts: Arc<dyn AccountManager>,
    pub rule: SudoRule,
}

#[async_trait]
impl StepAction for InstallSudoRule {
    async fn execute(&self, _ctx: &StepContext<'_>) -> Result<()> {
        self.accounts.install_sudo_rule(&self.rule).await?;
        Ok(())
    }
}
