//! Pipeline definitions.
//!
//! A pipeline is an explicit, ordered list of steps. Dependencies are
//! declared on each step and validated against that order; the executor
//! never reorders steps.

use std::collections::HashSet;
use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use super::secrets::SecretGenerator;
use super::sentinel::validate_key;
use crate::domain::EnvironmentFacts;

/// Everything a step action may consult while running
pub struct StepContext<'a> {
    /// The run executing this step
    pub run_id: Uuid,

    /// Facts resolved before the first step
    pub facts: &'a EnvironmentFacts,

    /// Source of credentials for principals created by this step
    pub secrets: &'a SecretGenerator,
}

/// The side-effecting work of a step.
///
/// Actions must tolerate partial effects of an earlier, interrupted attempt:
/// a crash after the work but before the sentinel is written re-runs the
/// whole action.
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn execute(&self, ctx: &StepContext<'_>) -> Result<()>;
}

/// A single step in a pipeline
pub struct Step {
    /// Step identifier (unique within pipeline)
    pub id: String,

    /// Human-readable description
    pub description: String,

    /// Sentinel key gating this step (defaults to `id`)
    pub sentinel: String,

    /// Steps that must come earlier in the pipeline
    pub depends_on: Vec<String>,

    action: Box<dyn StepAction>,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        action: impl StepAction + 'static,
    ) -> Self {
        let id = id.into();
        Self {
            sentinel: id.clone(),
            id,
            description: description.into(),
            depends_on: Vec::new(),
            action: Box::new(action),
        }
    }

    /// Declare a dependency on an earlier step
    pub fn after(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    /// Gate this step on a sentinel other than its id
    pub fn with_sentinel(mut self, key: impl Into<String>) -> Self {
        self.sentinel = key.into();
        self
    }

    pub fn action(&self) -> &dyn StepAction {
        self.action.as_ref()
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("sentinel", &self.sentinel)
            .field("depends_on", &self.depends_on)
            .finish_non_exhaustive()
    }
}

/// A complete, ordered pipeline
#[derive(Debug)]
pub struct Pipeline {
    /// Pipeline name (for logs)
    pub name: String,

    /// Ordered list of steps to execute
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    /// Append a step (builder style)
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }

        if self.steps.is_empty() {
            anyhow::bail!("Pipeline must have at least one step");
        }

        let mut seen: HashSet<&str> = HashSet::new();
        let mut sentinels: HashSet<&str> = HashSet::new();

        for (i, step) in self.steps.iter().enumerate() {
            if step.id.is_empty() {
                anyhow::bail!("Step {} has an empty id", i);
            }
            validate_key(&step.id).map_err(|e| anyhow::anyhow!("Step {}: {}", i, e))?;
            validate_key(&step.sentinel)
                .map_err(|e| anyhow::anyhow!("Step '{}': {}", step.id, e))?;

            if !seen.insert(step.id.as_str()) {
                anyhow::bail!("Duplicate step id '{}'", step.id);
            }
            if !sentinels.insert(step.sentinel.as_str()) {
                anyhow::bail!(
                    "Step '{}' reuses sentinel '{}' of an earlier step",
                    step.id,
                    step.sentinel
                );
            }

            for dep in &step.depends_on {
                match self.step_index(dep) {
                    Some(idx) if idx >= i => {
                        anyhow::bail!(
                            "Step '{}' depends on later step '{}' (forward references not allowed)",
                            step.id,
                            dep
                        );
                    }
                    None => {
                        anyhow::bail!(
                            "Step '{}' depends on non-existent step '{}'",
                            step.id,
                            dep
                        );
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Get a step by id
    pub fn get_step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Get the index of a step by id
    pub fn step_index(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }
}
