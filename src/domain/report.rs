//! Per-run outcome of each step.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to one step during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Sentinel already present, action not executed
    Skipped,

    /// Action executed and sentinel written
    Executed,
}

/// Ordered outcomes for the steps a run reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub run_id: Uuid,
    pub outcomes: Vec<(String, StepOutcome)>,
}

impl Report {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            outcomes: Vec::new(),
        }
    }

    pub fn record(&mut self, step_id: &str, outcome: StepOutcome) {
        self.outcomes.push((step_id.to_string(), outcome));
    }

    pub fn outcome(&self, step_id: &str) -> Option<StepOutcome> {
        self.outcomes
            .iter()
            .find(|(id, _)| id == step_id)
            .map(|(_, outcome)| *outcome)
    }

    /// Number of steps whose action actually ran
    pub fn executed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == StepOutcome::Executed)
            .count()
    }

    /// True when every step was skipped (a no-op re-run)
    pub fn all_skipped(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, o)| *o == StepOutcome::Skipped)
    }
}
