//! Main orchestrator for pipeline execution.
//!
//! Coordinates the run lock, environment resolution, sentinel-gated step
//! execution and journaling.

use std::path::PathBuf;
use std::time::Instant;

use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::adapters::ProbeError;
use crate::domain::{EnvironmentFacts, Event, EventType, Report, StepOutcome};

use super::journal::RunJournal;
use super::lock::{LockError, RunLock};
use super::pipeline::{Pipeline, StepContext};
use super::probe::EnvironmentProbe;
use super::runner::{StepError, StepRunner};
use super::secrets::SecretGenerator;
use super::sentinel::SentinelStore;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid pipeline: {0:#}")]
    Invalid(anyhow::Error),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("environment probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("provisioning halted: {source}")]
    Step {
        step: String,
        /// Outcomes of the steps that ran before the failure
        report: Report,
        #[source]
        source: StepError,
    },
}

impl PipelineError {
    /// Id of the failing step, if the failure happened inside one
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. } => Some(step),
            _ => None,
        }
    }
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    runner: StepRunner,
    journal: RunJournal,
    lock_path: PathBuf,
    secrets: SecretGenerator,
}

impl Orchestrator {
    pub fn new(sentinels: SentinelStore, journal: RunJournal, lock_path: impl Into<PathBuf>) -> Self {
        Self {
            runner: StepRunner::new(sentinels).with_journal(journal.clone()),
            journal,
            lock_path: lock_path.into(),
            secrets: SecretGenerator::default(),
        }
    }

    pub fn sentinels(&self) -> &SentinelStore {
        self.runner.sentinels()
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    /// Full run: lock the host, resolve the environment, then run every step.
    #[instrument(skip(self, pipeline, probe), fields(pipeline = %pipeline.name))]
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        probe: &EnvironmentProbe,
    ) -> Result<Report, PipelineError> {
        pipeline.validate().map_err(PipelineError::Invalid)?;

        let _lock = RunLock::acquire(&self.lock_path)?;

        let run_id = Uuid::new_v4();
        info!(%run_id, "Starting provisioning run");
        self.record(Event::new(
            run_id,
            None,
            EventType::RunStarted,
            format!("Pipeline '{}' started", pipeline.name),
        ))
        .await;

        let facts = match probe.resolve().await {
            Ok(facts) => facts,
            Err(e) => {
                error!(error = %e, "Environment probe failed");
                self.record(
                    Event::new(run_id, None, EventType::RunFailed, "Environment probe failed")
                        .with_error(e.to_string()),
                )
                .await;
                return Err(e.into());
            }
        };

        self.run_steps(run_id, pipeline, facts).await
    }

    /// Run the steps of `pipeline` in order against resolved facts.
    ///
    /// The caller is responsible for holding the run lock.
    pub async fn run_steps(
        &self,
        run_id: Uuid,
        pipeline: &Pipeline,
        facts: &EnvironmentFacts,
    ) -> Result<Report, PipelineError> {
        pipeline.validate().map_err(PipelineError::Invalid)?;

        let ctx = StepContext {
            run_id,
            facts,
            secrets: &self.secrets,
        };
        let mut report = Report::new(run_id);
        let run_started = Instant::now();

        for step in pipeline.steps() {
            let started = Instant::now();
            match self.runner.run(step, &ctx).await {
                Ok(StepOutcome::Skipped) => {
                    self.record(Event::new(
                        run_id,
                        Some(step.id.clone()),
                        EventType::StepSkipped,
                        "Sentinel present",
                    ))
                    .await;
                    report.record(&step.id, StepOutcome::Skipped);
                }
                Ok(StepOutcome::Executed) => {
                    self.record(
                        Event::new(
                            run_id,
                            Some(step.id.clone()),
                            EventType::StepCompleted,
                            step.description.clone(),
                        )
                        .with_duration(started.elapsed().as_millis() as u64),
                    )
                    .await;
                    report.record(&step.id, StepOutcome::Executed);
                }
                Err(e) => {
                    error!(step = %step.id, error = %e, "Step failed");
                    self.record(
                        Event::new(
                            run_id,
                            Some(step.id.clone()),
                            EventType::StepFailed,
                            step.description.clone(),
                        )
                        .with_duration(started.elapsed().as_millis() as u64)
                        .with_error(e.to_string()),
                    )
                    .await;
                    self.record(
                        Event::new(
                            run_id,
                            Some(step.id.clone()),
                            EventType::RunFailed,
                            format!("Halted at step '{}'", step.id),
                        )
                        .with_error(e.to_string()),
                    )
                    .await;
                    return Err(PipelineError::Step {
                        step: step.id.clone(),
                        report,
                        source: e,
                    });
                }
            }
        }

        info!(
            executed = report.executed(),
            skipped = report.outcomes.len() - report.executed(),
            "Provisioning complete"
        );
        self.record(
            Event::new(
                run_id,
                None,
                EventType::RunCompleted,
                format!("{} step(s) executed", report.executed()),
            )
            .with_duration(run_started.elapsed().as_millis() as u64),
        )
        .await;

        Ok(report)
    }

    async fn record(&self, event: Event) {
        if let Err(e) = self.journal.append(&event).await {
            warn!(error = %e, "Failed to append to run journal");
        }
    }
}
