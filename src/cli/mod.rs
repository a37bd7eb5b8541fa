//! Command-line interface for hostboot.
//!
//! Provides commands for running the bootstrap, previewing which steps are
//! still pending, inspecting the run journal, and resetting sentinels.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::HttpMetadataClient;
use crate::config::{load_config, ResolvedConfig};
use crate::core::{EnvironmentProbe, Orchestrator, PipelineError, RunJournal, RunLock, SentinelStore};
use crate::domain::{Report, RunState, StepOutcome};
use crate::recipes::{self, HostAdapters};

/// hostboot - idempotent single-host server bootstrap
#[derive(Parser, Debug)]
#[command(name = "hostboot")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to /etc/hostboot/config.yaml)
    #[arg(short, long, global = true, env = "HOSTBOOT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every pending step
    Run,

    /// Show the step list and which steps are already done
    Plan,

    /// Show the most recent run, or a specific one
    Status {
        /// Run ID (UUID)
        run_id: Option<String>,
    },

    /// List recent runs
    History {
        /// Maximum number of runs to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },

    /// Remove a step's sentinel so the next run executes it again
    Reset {
        /// Step ID
        #[arg(required_unless_present = "all")]
        step: Option<String>,

        /// Remove every sentinel
        #[arg(long, conflicts_with = "step")]
        all: bool,
    },

    /// Show the resolved configuration
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        match self.command {
            Commands::Run => run(&config).await,
            Commands::Plan => plan(&config),
            Commands::Status { run_id } => show_status(&config, run_id.as_deref()).await,
            Commands::History { limit } => list_runs(&config, limit).await,
            Commands::Reset { step, all } => reset(&config, step.as_deref(), all),
            Commands::Config => show_config(&config),
        }
    }
}

fn orchestrator(config: &ResolvedConfig) -> Orchestrator {
    Orchestrator::new(
        SentinelStore::new(config.sentinel_dir()),
        RunJournal::new(config.journal_path()),
        config.lock_path(),
    )
}

fn outcome_label(outcome: StepOutcome) -> &'static str {
    match outcome {
        StepOutcome::Skipped => "skipped",
        StepOutcome::Executed => "executed",
    }
}

fn print_report(report: &Report) {
    for (step, outcome) in &report.outcomes {
        eprintln!("  {:<24} {}", step, outcome_label(*outcome));
    }
}

/// Run the bootstrap pipeline
async fn run(config: &ResolvedConfig) -> Result<()> {
    let host = HostAdapters::system(config);
    let pipeline = recipes::bootstrap(config, &host);

    let metadata = Arc::new(HttpMetadataClient::new(
        config.metadata.endpoint.clone(),
        config.metadata_timeout(),
    ));
    let probe = EnvironmentProbe::new(metadata, &config.os_release);

    match orchestrator(config).execute(&pipeline, &probe).await {
        Ok(report) => {
            print_report(&report);
            if report.all_skipped() {
                eprintln!("\n[Run {}: nothing to do, every step already done]", report.run_id);
            } else {
                eprintln!(
                    "\n[Run {} completed: {} step(s) executed]",
                    report.run_id,
                    report.executed()
                );
            }
            Ok(())
        }
        Err(e) => {
            if let PipelineError::Step { report, step, .. } = &e {
                print_report(report);
                eprintln!("  {:<24} failed", step);
                eprintln!("\n[Run {} halted; fix the cause and re-run]", report.run_id);
            }
            Err(e.into())
        }
    }
}

/// List the recipe's steps with their sentinel state
fn plan(config: &ResolvedConfig) -> Result<()> {
    let host = HostAdapters::system(config);
    let pipeline = recipes::bootstrap(config, &host);
    pipeline.validate()?;
    let sentinels = SentinelStore::new(config.sentinel_dir());

    println!("{:<24} {:<8} {:<28} DESCRIPTION", "STEP", "STATE", "AFTER");
    println!("{}", "-".repeat(90));

    for step in pipeline.steps() {
        let state = if sentinels.exists(&step.sentinel)? {
            "done"
        } else {
            "pending"
        };
        println!(
            "{:<24} {:<8} {:<28} {}",
            step.id,
            state,
            step.depends_on.join(","),
            step.description
        );
    }

    Ok(())
}

/// Show the status of a run
async fn show_status(config: &ResolvedConfig, run_id: Option<&str>) -> Result<()> {
    let journal = RunJournal::new(config.journal_path());
    let runs = journal.runs().await?;

    let run = match run_id {
        Some(id_str) => {
            let id = Uuid::parse_str(id_str)
                .with_context(|| format!("Invalid run ID: {}", id_str))?;
            runs.into_iter()
                .find(|r| r.id == id)
                .with_context(|| format!("No run {} in {}", id, journal.path().display()))?
        }
        None => match runs.into_iter().next() {
            Some(run) => run,
            None => {
                println!("No runs recorded");
                return Ok(());
            }
        },
    };

    println!("Run ID: {}", run.id);
    println!("State: {}", run.state);
    println!("Started: {}", run.started_at);
    if let Some(completed) = run.completed_at {
        println!("Completed: {}", completed);
    }
    if run.is_running() {
        println!("(no terminal event: the run is in progress or was interrupted)");
    }
    println!("\nSteps:");
    for (step, status) in &run.steps {
        println!("  {}: {}", step, status);
    }

    Ok(())
}

/// List recent runs
async fn list_runs(config: &ResolvedConfig, limit: usize) -> Result<()> {
    let journal = RunJournal::new(config.journal_path());
    let runs = journal.runs().await?;

    if runs.is_empty() {
        println!("No runs found");
        return Ok(());
    }

    println!("{:<38} {:<27} {:<10} FAILED STEP", "RUN ID", "STARTED", "STATE");
    println!("{}", "-".repeat(90));

    for run in runs.into_iter().take(limit) {
        let (state, failed_step) = match &run.state {
            RunState::Running => ("running", String::new()),
            RunState::Completed => ("completed", String::new()),
            RunState::Failed { step, .. } => ("failed", step.clone().unwrap_or_default()),
        };
        println!(
            "{:<38} {:<27} {:<10} {}",
            run.id,
            run.started_at.format("%Y-%m-%d %H:%M:%S UTC"),
            state,
            failed_step
        );
    }

    Ok(())
}

/// Clear one sentinel, or all of them
fn reset(config: &ResolvedConfig, step: Option<&str>, all: bool) -> Result<()> {
    // Never pull sentinels out from under a live run
    let _lock = RunLock::acquire(&config.lock_path())?;
    let sentinels = SentinelStore::new(config.sentinel_dir());

    let keys = if all {
        sentinels.list()?
    } else {
        let id = step.context("A step ID or --all is required")?;
        let host = HostAdapters::system(config);
        let pipeline = recipes::bootstrap(config, &host);
        let step = pipeline
            .get_step(id)
            .with_context(|| format!("Unknown step '{}'", id))?;
        vec![step.sentinel.clone()]
    };

    for key in keys {
        if sentinels.clear(&key)? {
            println!("Cleared {}", key);
        } else {
            println!("{} was not set", key);
        }
    }

    Ok(())
}

/// Show the resolved configuration (for debugging)
fn show_config(config: &ResolvedConfig) -> Result<()> {
    let rendered =
        serde_yaml::to_string(config).context("Failed to render configuration")?;
    println!("# {}", config.config_file.display());
    print!("{}", rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_reset_requires_step_or_all() {
        assert!(Cli::try_parse_from(["hostboot", "reset"]).is_err());
        assert!(Cli::try_parse_from(["hostboot", "reset", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["hostboot", "reset", "sudo-policy", "--all"]).is_err());

        let cli = Cli::try_parse_from(["hostboot", "reset", "sudo-policy"]).unwrap();
        match cli.command {
            Commands::Reset { step, all } => {
                assert_eq!(step.as_deref(), Some("sudo-policy"));
                assert!(!all);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::try_parse_from(["hostboot", "plan", "--config", "/tmp/hb.yaml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/hb.yaml")));
    }
}
