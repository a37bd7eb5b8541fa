//! Core provisioning logic.
//!
//! This module contains:
//! - SentinelStore: durable per-step completion markers
//! - Secrets: credential generation and backup
//! - Pipeline / StepRunner: ordered, sentinel-gated step execution
//! - EnvironmentProbe: zone, region and platform resolution
//! - RunLock / RunJournal: run exclusion and the diagnostic event log
//! - Orchestrator: main execution engine

pub mod io;
pub mod journal;
pub mod lock;
pub mod orchestrator;
pub mod pipeline;
pub mod probe;
pub mod runner;
pub mod secrets;
pub mod sentinel;

// Re-export commonly used types
pub use journal::{JournalError, RunJournal};
pub use lock::{LockError, RunLock};
pub use orchestrator::{Orchestrator, PipelineError};
pub use pipeline::{Pipeline, Step, StepAction, StepContext};
pub use probe::EnvironmentProbe;
pub use runner::{StepError, StepRunner};
pub use secrets::{Secret, SecretError, SecretGenerator, SecretValue};
pub use sentinel::{SentinelError, SentinelStore};
