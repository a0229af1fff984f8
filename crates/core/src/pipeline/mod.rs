//! Ordered step execution with compensating rollback.
//!
//! A [`Pipeline`] runs its steps one at a time in position order against a
//! shared context. When a step fails, every step that already completed is
//! rolled back, most recent first. Rollback is best-effort: a failing
//! rollback is recorded and the remaining ones still run. The original
//! failure is then returned with the rollback failures attached.

use tracing::{error, info, warn};

use crate::errors::{PipelineError, RollbackFailure, StepError};

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// A named unit of pipeline work.
pub trait Step<C> {
    /// Stable identifier used in logs and errors.
    fn id(&self) -> &str;

    /// Sort key; lower positions run first.
    fn position(&self) -> u32;

    /// Whether the step talks to a remote repository.
    fn requires_remote(&self) -> bool {
        false
    }

    fn execute(&self, context: &mut C) -> Result<(), StepError>;

    /// Undo the effect of a completed [`execute`](Self::execute).
    fn rollback(&self, _context: &mut C) -> Result<(), StepError> {
        Ok(())
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Refuse to run pipelines containing remote steps.
    pub offline: bool,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Step ids in execution order.
    pub completed: Vec<String>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A totally ordered list of steps over a context of type `C`.
pub struct Pipeline<C> {
    steps: Vec<Box<dyn Step<C>>>,
}

impl<C> Default for Pipeline<C> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<C> Pipeline<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step, keeping the list sorted by position. Steps sharing a
    /// position keep insertion order.
    pub fn add_step(&mut self, step: Box<dyn Step<C>>) {
        let index = self
            .steps
            .partition_point(|s| s.position() <= step.position());
        self.steps.insert(index, step);
    }

    pub fn with_step(mut self, step: impl Step<C> + 'static) -> Self {
        self.add_step(Box::new(step));
        self
    }

    /// Step ids in execution order.
    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute every step in order.
    ///
    /// On failure, completed steps are rolled back in reverse order before
    /// the error is returned as [`PipelineError::Failed`]. A
    /// [`StepError::Blocked`] failure rolls nothing back and surfaces as
    /// [`PipelineError::Blocked`].
    pub fn run(&self, context: &mut C, options: &RunOptions) -> Result<RunSummary, PipelineError> {
        if options.offline {
            let steps: Vec<String> = self
                .steps
                .iter()
                .filter(|s| s.requires_remote())
                .map(|s| s.id().to_string())
                .collect();
            if !steps.is_empty() {
                warn!(?steps, "offline run rejected");
                return Err(PipelineError::OfflineViolation { steps });
            }
        }

        let mut completed: Vec<&dyn Step<C>> = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            info!(step = step.id(), position = step.position(), "executing step");
            match step.execute(context) {
                Ok(()) => {
                    info!(step = step.id(), "step completed");
                    completed.push(step.as_ref());
                }
                Err(source) if source.is_blocked() => {
                    warn!(step = step.id(), error = %source, "release blocked");
                    return Err(PipelineError::Blocked {
                        step: step.id().to_string(),
                        source,
                        rollback_failures: Vec::new(),
                    });
                }
                Err(source) => {
                    error!(step = step.id(), error = %source, "step failed");
                    let rollback_failures = Self::roll_back(completed, context);
                    return Err(PipelineError::Failed {
                        step: step.id().to_string(),
                        source,
                        rollback_failures,
                    });
                }
            }
        }

        Ok(RunSummary {
            completed: completed.iter().map(|s| s.id().to_string()).collect(),
        })
    }

    fn roll_back(completed: Vec<&dyn Step<C>>, context: &mut C) -> Vec<RollbackFailure> {
        let mut failures = Vec::new();
        for step in completed.into_iter().rev() {
            info!(step = step.id(), "rolling back step");
            if let Err(error) = step.rollback(context) {
                error!(step = step.id(), %error, "rollback failed, continuing");
                failures.push(RollbackFailure {
                    step: step.id().to_string(),
                    error,
                });
            }
        }
        failures
    }
}

impl<C> std::fmt::Debug for Pipeline<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("steps", &self.step_ids())
            .finish()
    }
}
