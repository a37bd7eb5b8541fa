//! Adapter interfaces for external systems.
//!
//! Every collaborator the provisioning steps touch sits behind a trait so
//! tests can substitute an in-memory host:
//! - `CommandRunner`: child processes, argv only, never a shell
//! - `MetadataSource`: the cloud instance metadata service
//! - `ArtifactFetcher`: package downloads
//! - `AccountManager`: OS users, groups and sudoers

pub mod accounts;
pub mod command;
pub mod fetch;
pub mod metadata;

pub use accounts::{AccountManager, SystemAccounts, UserChange};
pub use command::{Arg, Command, CommandError, CommandOutput, CommandRunner, SystemCommandRunner};
pub use fetch::{ArtifactFetcher, FetchError, FetchOutcome, HttpFetcher};
pub use metadata::{HttpMetadataClient, MetadataSource, ProbeError, DEFAULT_ZONE_ENDPOINT};
