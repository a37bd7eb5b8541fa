//! The server bootstrap recipe.
//!
//! Builds the ordered step list from configuration. Server steps come first,
//! then OS accounts:
//!
//! | Step | Depends on |
//! |------|------------|
//! | fetch-package | |
//! | install-package | fetch-package |
//! | configure-server | install-package |
//! | create-organization | configure-server |
//! | provision-accounts | |
//! | admin-group | provision-accounts |
//! | lock-default-account | provision-accounts |
//! | sudo-policy | admin-group |
//!
//! The account steps are omitted when their configuration is absent.

pub mod accounts;
pub mod server;

use std::sync::Arc;

use crate::adapters::{
    AccountManager, ArtifactFetcher, CommandRunner, HttpFetcher, SystemAccounts,
    SystemCommandRunner,
};
use crate::config::ResolvedConfig;
use crate::core::{Pipeline, Step};

pub const FETCH_PACKAGE: &str = "fetch-package";
pub const INSTALL_PACKAGE: &str = "install-package";
pub const CONFIGURE_SERVER: &str = "configure-server";
pub const CREATE_ORGANIZATION: &str = "create-organization";
pub const PROVISION_ACCOUNTS: &str = "provision-accounts";
pub const ADMIN_GROUP: &str = "admin-group";
pub const LOCK_DEFAULT_ACCOUNT: &str = "lock-default-account";
pub const SUDO_POLICY: &str = "sudo-policy";

/// The external collaborators steps act through
#[derive(Clone)]
pub struct HostAdapters {
    pub commands: Arc<dyn CommandRunner>,
    pub fetcher: Arc<dyn ArtifactFetcher>,
    pub accounts: Arc<dyn AccountManager>,
}

impl HostAdapters {
    /// Adapters that act on the real host
    pub fn system(config: &ResolvedConfig) -> Self {
        let commands: Arc<dyn CommandRunner> = Arc::new(SystemCommandRunner::new());
        let accounts = Arc::new(SystemAccounts::new(
            commands.clone(),
            &config.sudoers_dir,
            &config.accounts.shell,
            config.command_timeout(),
        ));
        Self {
            commands,
            fetcher: Arc::new(HttpFetcher::new(config.fetch_timeout())),
            accounts,
        }
    }
}

/// Build the bootstrap pipeline for `config`
pub fn bootstrap(config: &ResolvedConfig, host: &HostAdapters) -> Pipeline {
    let package_path = config.package_path();
    let timeout = config.command_timeout();

    let mut pipeline = Pipeline::new("server-bootstrap")
        .step(Step::new(
            FETCH_PACKAGE,
            "Fetch server package",
            server::FetchPackage {
                fetcher: host.fetcher.clone(),
                url: config.package.url.clone(),
                path: package_path.clone(),
                sha256: config.package.sha256.clone(),
            },
        ))
        .step(
            Step::new(
                INSTALL_PACKAGE,
                "Install server package",
                server::InstallPackage {
                    runner: host.commands.clone(),
                    install_command: config.package.install_command.clone(),
                    path: package_path,
                    timeout,
                },
            )
            .after(FETCH_PACKAGE),
        )
        .step(
            Step::new(
                CONFIGURE_SERVER,
                "Configure server",
                server::ConfigureServer {
                    runner: host.commands.clone(),
                    ctl: config.server.ctl.clone(),
                    passes: config.server.reconfigure_passes,
                    timeout,
                },
            )
            .after(INSTALL_PACKAGE),
        )
        .step(
            Step::new(
                CREATE_ORGANIZATION,
                "Create organization and server principals",
                server::CreateOrganization {
                    runner: host.commands.clone(),
                    ctl: config.server.ctl.clone(),
                    organization: config.organization.clone(),
                    secrets_dir: config.secrets_dir.clone(),
                    timeout,
                },
            )
            .after(CONFIGURE_SERVER),
        );

    let os = &config.accounts;
    if !os.users.is_empty() {
        pipeline = pipeline.step(Step::new(
            PROVISION_ACCOUNTS,
            "Provision OS accounts",
            accounts::ProvisionAccounts {
                accounts: host.accounts.clone(),
                users: os.users.clone(),
            },
        ));
    }

    if let Some(group) = &os.admin_group {
        let mut step = Step::new(
            ADMIN_GROUP,
            "Set administrative group membership",
            accounts::ReplaceGroup {
                accounts: host.accounts.clone(),
                group: group.clone(),
            },
        );
        if !os.users.is_empty() {
            step = step.after(PROVISION_ACCOUNTS);
        }
        pipeline = pipeline.step(step);
    }

    if os.lock_default_account {
        let mut step = Step::new(
            LOCK_DEFAULT_ACCOUNT,
            "Lock default cloud account",
            accounts::LockDefaultAccount {
                accounts: host.accounts.clone(),
                login: os.default_account.clone(),
            },
        );
        if !os.users.is_empty() {
            step = step.after(PROVISION_ACCOUNTS);
        }
        pipeline = pipeline.step(step);
    }

    if let Some(rule) = &os.sudo {
        let mut step = Step::new(
            SUDO_POLICY,
            "Install sudo policy",
            accounts::InstallSudoRule {
                accounts: host.accounts.clone(),
                rule: rule.clone(),
            },
        );
        if os.admin_group.is_some() {
            step = step.after(ADMIN_GROUP);
        }
        pipeline = pipeline.step(step);
    }

    pipeline
}
