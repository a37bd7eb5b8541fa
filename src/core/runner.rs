//! Sentinel-gated execution of a single step.

use thiserror::Error;
use tracing::{debug, info, warn};

use super::journal::RunJournal;
use super::pipeline::{Step, StepContext};
use super::sentinel::{SentinelError, SentinelStore};
use crate::domain::{Event, EventType, StepOutcome};

#[derive(Debug, Error)]
pub enum StepError {
    #[error("could not determine whether step '{step}' already ran: {source}")]
    SentinelCheck {
        step: String,
        #[source]
        source: SentinelError,
    },

    #[error("step '{step}' failed: {error:#}")]
    Action { step: String, error: anyhow::Error },

    #[error("step '{step}' succeeded but its sentinel was not recorded: {source}")]
    SentinelWrite {
        step: String,
        #[source]
        source: SentinelError,
    },
}

impl StepError {
    /// Id of the step that failed
    pub fn step(&self) -> &str {
        match self {
            Self::SentinelCheck { step, .. }
            | Self::Action { step, .. }
            | Self::SentinelWrite { step, .. } => step,
        }
    }
}

/// Runs steps at most once per host
#[derive(Debug, Clone)]
pub struct StepRunner {
    sentinels: SentinelStore,
    journal: Option<RunJournal>,
}

impl StepRunner {
    pub fn new(sentinels: SentinelStore) -> Self {
        Self {
            sentinels,
            journal: None,
        }
    }

    /// Record a `StepStarted` event before each action runs
    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn sentinels(&self) -> &SentinelStore {
        &self.sentinels
    }

    /// Execute `step` unless its sentinel already exists.
    ///
    /// The sentinel is written only after the action returns `Ok`. A failed
    /// action leaves no sentinel so the next run retries it.
    pub async fn run(
        &self,
        step: &Step,
        ctx: &StepContext<'_>,
    ) -> Result<StepOutcome, StepError> {
        let done = self
            .sentinels
            .exists(&step.sentinel)
            .map_err(|source| StepError::SentinelCheck {
                step: step.id.clone(),
                source,
            })?;
        if done {
            debug!(step = %step.id, sentinel = %step.sentinel, "Sentinel present, skipping");
            return Ok(StepOutcome::Skipped);
        }

        if let Some(journal) = &self.journal {
            let event = Event::new(
                ctx.run_id,
                Some(step.id.clone()),
                EventType::StepStarted,
                step.description.clone(),
            );
            if let Err(e) = journal.append(&event).await {
                warn!(error = %e, "Failed to append to run journal");
            }
        }

        info!(step = %step.id, "{}", step.description);
        step.action()
            .execute(ctx)
            .await
            .map_err(|error| StepError::Action {
                step: step.id.clone(),
                error,
            })?;

        self.sentinels
            .mark(&step.sentinel, ctx.run_id)
            .map_err(|source| StepError::SentinelWrite {
                step: step.id.clone(),
                source,
            })?;
        Ok(StepOutcome::Executed)
    }
}
