//! Run state reconstructed from journal events.
//!
//! A Run is one invocation of the pipeline on this host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{Event, EventType, StepStatus};

/// A pipeline run as seen through its journal entries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    /// Unique identifier for this run
    pub id: Uuid,

    /// Current state of the run
    pub state: RunState,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished (if it did)
    pub completed_at: Option<DateTime<Utc>>,

    /// Status of each step in the order they were first seen
    pub steps: Vec<(String, StepStatus)>,
}

impl Run {
    /// Reconstruct run state from a sequence of events belonging to one run
    pub fn from_events(events: &[Event]) -> Option<Self> {
        let first_event = events.first()?;

        let mut run = Self {
            id: first_event.run_id,
            state: RunState::Running,
            started_at: first_event.timestamp,
            completed_at: None,
            steps: Vec::new(),
        };

        for event in events {
            run.apply_event(event);
        }

        Some(run)
    }

    /// Apply a single event to update run state
    pub fn apply_event(&mut self, event: &Event) {
        match event.event_type {
            EventType::RunStarted => {
                self.state = RunState::Running;
                self.started_at = event.timestamp;
            }
            EventType::RunCompleted => {
                self.state = RunState::Completed;
                self.completed_at = Some(event.timestamp);
            }
            EventType::RunFailed => {
                self.state = RunState::Failed {
                    step: event.step_id.clone(),
                    error: event.error.clone().unwrap_or_default(),
                };
                self.completed_at = Some(event.timestamp);
            }
            EventType::StepSkipped => self.set_step(event, StepStatus::Skipped),
            EventType::StepStarted => self.set_step(event, StepStatus::Running),
            EventType::StepCompleted => self.set_step(event, StepStatus::Completed),
            EventType::StepFailed => self.set_step(event, StepStatus::Failed),
        }
    }

    fn set_step(&mut self, event: &Event, status: StepStatus) {
        let Some(ref step_id) = event.step_id else {
            return;
        };
        match self.steps.iter_mut().find(|(id, _)| id == step_id) {
            Some(entry) => entry.1 = status,
            None => self.steps.push((step_id.clone(), status)),
        }
    }

    /// Check if the run is still in progress (or died without a terminal event)
    pub fn is_running(&self) -> bool {
        matches!(self.state, RunState::Running)
    }

    /// Status of a step, if the run reached it
    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.steps
            .iter()
            .find(|(id, _)| id == step_id)
            .map(|(_, status)| *status)
    }
}

/// State of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum RunState {
    /// Currently executing, or interrupted before a terminal event
    Running,

    /// Completed successfully
    Completed,

    /// Halted on an error
    Failed { step: Option<String>, error: String },
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Running => write!(f, "running"),
            RunState::Completed => write!(f, "completed"),
            RunState::Failed {
                step: Some(step),
                error,
            } => write!(f, "failed at '{}': {}", step, error),
            RunState::Failed { step: None, error } => write!(f, "failed: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_from_events() {
        let run_id = Uuid::new_v4();

        let events = vec![
            Event::new(run_id, None, EventType::RunStarted, "Run started"),
            Event::new(
                run_id,
                Some("fetch-package".to_string()),
                EventType::StepSkipped,
                "sentinel present",
            ),
            Event::new(
                run_id,
                Some("install-package".to_string()),
                EventType::StepStarted,
                "Step started",
            ),
            Event::new(
                run_id,
                Some("install-package".to_string()),
                EventType::StepCompleted,
                "Step completed",
            ),
            Event::new(run_id, None, EventType::RunCompleted, "Run completed"),
        ];

        let run = Run::from_events(&events).unwrap();

        assert_eq!(run.id, run_id);
        assert_eq!(run.state, RunState::Completed);
        assert_eq!(run.step_status("fetch-package"), Some(StepStatus::Skipped));
        assert_eq!(
            run.step_status("install-package"),
            Some(StepStatus::Completed)
        );
        assert_eq!(run.steps.len(), 2);
    }

    #[test]
    fn test_failed_run_names_step() {
        let run_id = Uuid::new_v4();
        let events = vec![
            Event::new(run_id, None, EventType::RunStarted, "Run started"),
            Event::new(
                run_id,
                Some("configure-server".to_string()),
                EventType::StepStarted,
                "Step started",
            ),
            Event::new(
                run_id,
                Some("configure-server".to_string()),
                EventType::StepFailed,
                "Step failed",
            )
            .with_error("exit code 1".to_string()),
            Event::new(
                run_id,
                Some("configure-server".to_string()),
                EventType::RunFailed,
                "Run failed",
            )
            .with_error("exit code 1".to_string()),
        ];

        let run = Run::from_events(&events).unwrap();
        assert_eq!(
            run.state,
            RunState::Failed {
                step: Some("configure-server".to_string()),
                error: "exit code 1".to_string(),
            }
        );
        assert_eq!(run.step_status("configure-server"), Some(StepStatus::Failed));
    }

    #[test]
    fn test_interrupted_run_stays_running() {
        let run_id = Uuid::new_v4();
        let events = vec![
            Event::new(run_id, None, EventType::RunStarted, "Run started"),
            Event::new(
                run_id,
                Some("install-package".to_string()),
                EventType::StepStarted,
                "Step started",
            ),
        ];

        let run = Run::from_events(&events).unwrap();
        assert!(run.is_running());
        assert_eq!(run.step_status("install-package"), Some(StepStatus::Running));
    }

    #[test]
    fn test_empty_events() {
        assert!(Run::from_events(&[]).is_none());
    }
}
