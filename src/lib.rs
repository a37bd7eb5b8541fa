//! hostboot - idempotent single-host server bootstrap
//!
//! Installs a configuration-management server package, creates its
//! organization and server principals, and provisions OS accounts, an
//! administrative group, a locked default cloud account and a sudo policy.
//!
//! # Architecture
//!
//! The bootstrap is an explicit, ordered list of steps:
//! - Each step is gated by an on-host sentinel; a completed step never runs again
//! - The first failing step halts the run and leaves no sentinel behind
//! - Environment facts are resolved once, before any step, and passed in
//! - Every transition is appended to a JSONL journal for diagnosis
//!
//! # Modules
//!
//! - `adapters`: External collaborators (commands, metadata, downloads, accounts)
//! - `core`: Sentinels, secrets, pipeline execution, probe, lock, journal
//! - `domain`: Data structures (EnvironmentFacts, Principal, Report, Event, Run)
//! - `recipes`: The server bootstrap step list
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Preview pending steps
//! hostboot plan --config /etc/hostboot/config.yaml
//!
//! # Bootstrap the host (safe to re-run)
//! hostboot run
//!
//! # Inspect the last run
//! hostboot status
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod recipes;

// Re-export main types at crate root for convenience
pub use crate::core::{Orchestrator, Pipeline, PipelineError, Step, StepAction, StepContext};
pub use crate::domain::{EnvironmentFacts, Event, EventType, Report, Run, RunState, StepOutcome};
