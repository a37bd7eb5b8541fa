//! Event types for the run journal.
//!
//! Every run appends its lifecycle to an append-only log so that a failed
//! bootstrap can be diagnosed after the process has exited.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in the run journal.
///
/// The journal is diagnostic only: step completion is decided by sentinels,
/// never by replaying events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Step this event refers to (None for run-level events)
    pub step_id: Option<String>,

    /// Type of event
    pub event_type: EventType,

    /// Human-readable summary (NO secrets)
    pub summary: String,

    /// Time taken in milliseconds (for finished steps)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error chain if the step or run failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Event {
    /// Create a new event with the current timestamp
    pub fn new(
        run_id: Uuid,
        step_id: Option<String>,
        event_type: EventType,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id,
            step_id,
            event_type,
            summary: summary.into(),
            duration_ms: None,
            error: None,
        }
    }

    /// Attach duration information
    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Attach error information
    pub fn with_error(mut self, error: String) -> Self {
        self.error = Some(error);
        self
    }
}

/// Types of events recorded during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// A run acquired the lock and resolved its environment
    RunStarted,

    /// Every step finished or was skipped
    RunCompleted,

    /// A run halted on a failing step (or before the first step)
    RunFailed,

    /// A step's sentinel was already present
    StepSkipped,

    /// A step's action is about to execute
    StepStarted,

    /// A step's action succeeded and its sentinel was written
    StepCompleted,

    /// A step's action or sentinel I/O failed
    StepFailed,
}

/// Status of a step as reconstructed from the journal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// Started, no terminal event yet (the process died mid-step)
    Running,

    /// Completed successfully
    Completed,

    /// Failed (with error)
    Failed,

    /// Skipped (sentinel present)
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("install-package".to_string()),
            EventType::StepStarted,
            "Step 'install-package' started",
        );

        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("duration_ms"));
        let parsed: Event = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.event_type, EventType::StepStarted);
        assert_eq!(parsed.step_id.as_deref(), Some("install-package"));
    }

    #[test]
    fn test_event_with_error() {
        let event = Event::new(
            Uuid::new_v4(),
            Some("configure-server".to_string()),
            EventType::StepFailed,
            "Step 'configure-server' failed",
        )
        .with_duration(1500)
        .with_error("exit code 1".to_string());

        assert_eq!(event.duration_ms, Some(1500));
        assert_eq!(event.error, Some("exit code 1".to_string()));
    }
}
