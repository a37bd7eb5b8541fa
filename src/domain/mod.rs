//! Domain types for the hostboot provisioner.
//!
//! This module contains the core data structures:
//! - Environment: facts resolved from the host before any step runs
//! - Principal: accounts, groups and sudo policy to provision
//! - Report: per-step outcome of a run
//! - Events / Run: the diagnostic journal and its replayed state

pub mod environment;
pub mod events;
pub mod principal;
pub mod report;
pub mod run;

// Re-export commonly used types
pub use environment::{region_from_zone, EnvironmentFacts, Platform, ZoneError};
pub use events::{Event, EventType, StepStatus};
pub use principal::{Group, Principal, ServerPrincipal, SudoRule};
pub use report::{Report, StepOutcome};
pub use run::{Run, RunState};
