//! Retry coordinator: drives plan → apply → validate → fix until the
//! workspace validates or the attempt budget runs out.
//!
//! Everything here is sequential. Edits are applied one at a time in plan
//! order and the planner is awaited before anything else happens, which is
//! what keeps first-occurrence replacement deterministic.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::state_machine::{IllegalTransition, RetryMachine, RetryState, RetryStatus, TransitionRecord};
use crate::events::{EventEmitter, StreamClosed};
use crate::observer::{self, SharedObserver};
use crate::patch::{PatchApplier, PatchError};
use crate::plan::{placeholder_plan, ChangePlan};
use crate::planner::{FileContents, Planner};
use crate::validator::{Validate, ValidationResult};
use crate::workspace::{Workspace, WorkspaceError};

/// What to do when the initial plan has no edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyPlanPolicy {
    /// End the run with an error.
    #[default]
    Fail,
    /// Substitute a deterministic placeholder edit on the first source file.
    Placeholder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub empty_plan_policy: EmptyPlanPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            empty_plan_policy: EmptyPlanPolicy::Fail,
        }
    }
}

/// Why a run ended in `Failed`.
#[derive(Debug, thiserror::Error)]
pub enum RetryFailure {
    #[error("the planner produced no edits")]
    EmptyPlan,

    #[error("no source file available for a fallback edit")]
    NoFallbackTarget,

    #[error("text to replace was not found in `{file}`")]
    PatternNotFound { file: String },

    #[error("failed to apply edit: {0}")]
    Patch(PatchError),

    #[error("validation failed after {attempts} attempts:\n{report}")]
    ValidationExhausted { attempts: u32, report: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("client disconnected")]
    Disconnected,

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl From<StreamClosed> for RetryFailure {
    fn from(_: StreamClosed) -> Self {
        Self::Disconnected
    }
}

impl From<PatchError> for RetryFailure {
    fn from(err: PatchError) -> Self {
        match err {
            PatchError::PatternNotFound { file } => Self::PatternNotFound { file },
            other => Self::Patch(other),
        }
    }
}

/// Everything a finished run knows about itself.
#[derive(Debug)]
pub struct RetryReport {
    pub state: RetryState,
    pub transitions: Vec<TransitionRecord>,
    pub edits_applied: usize,
    pub planning_calls: u32,
    pub last_validation: Option<ValidationResult>,
    pub failure: Option<RetryFailure>,
}

impl RetryReport {
    pub fn succeeded(&self) -> bool {
        self.state.status == RetryStatus::Success
    }

    /// How many times the run entered `status`.
    pub fn entries(&self, status: RetryStatus) -> usize {
        self.transitions.iter().filter(|t| t.to == status).count()
    }
}

/// Per-run mutable bookkeeping.
struct RunState {
    machine: RetryMachine,
    edits_applied: usize,
    planning_calls: u32,
    last_validation: Option<ValidationResult>,
    tracked: Vec<String>,
}

pub struct RetryCoordinator {
    planner: Arc<dyn Planner>,
    validator: Arc<dyn Validate>,
    applier: PatchApplier,
    config: RetryConfig,
    observer: SharedObserver,
}

impl RetryCoordinator {
    pub fn new(
        planner: Arc<dyn Planner>,
        validator: Arc<dyn Validate>,
        applier: PatchApplier,
        config: RetryConfig,
    ) -> Self {
        Self {
            planner,
            validator,
            applier,
            config,
            observer: observer::noop(),
        }
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run the loop over `ws`. `files` are the candidate source files the
    /// planner sees, in sorted order.
    pub async fn run(
        &self,
        ws: &Workspace,
        files: &[String],
        instruction: &str,
        events: &mut EventEmitter,
    ) -> RetryReport {
        let mut run = RunState {
            machine: RetryMachine::new(self.config.max_attempts),
            edits_applied: 0,
            planning_calls: 0,
            last_validation: None,
            tracked: files.to_vec(),
        };

        let failure = match self.drive(&mut run, ws, instruction, events).await {
            Ok(()) => None,
            Err(failure) => {
                if !run.machine.is_terminal() {
                    if let Err(e) = run.machine.fail(&failure.to_string()) {
                        tracing::error!(error = %e, "Could not record failure transition");
                    }
                }
                Some(failure)
            }
        };

        tracing::info!(summary = %run.machine.summary(), "Retry loop finished");

        RetryReport {
            state: run.machine.state(),
            transitions: run.machine.transitions().to_vec(),
            edits_applied: run.edits_applied,
            planning_calls: run.planning_calls,
            last_validation: run.last_validation,
            failure,
        }
    }

    async fn drive(
        &self,
        run: &mut RunState,
        ws: &Workspace,
        instruction: &str,
        events: &mut EventEmitter,
    ) -> Result<(), RetryFailure> {
        events.checkpoint()?;
        let contents = ws.read_files(&run.tracked)?;
        let mut plan = self.initial_plan(run, &contents, instruction, events).await?;

        if plan.is_empty() {
            match self.config.empty_plan_policy {
                EmptyPlanPolicy::Fail => return Err(RetryFailure::EmptyPlan),
                EmptyPlanPolicy::Placeholder => {
                    let target = run
                        .tracked
                        .first()
                        .ok_or(RetryFailure::NoFallbackTarget)?;
                    tracing::warn!(path = %target, "Empty plan, substituting placeholder edit");
                    events.message("Creating fallback implementation to fulfill request...")?;
                    plan = placeholder_plan(target, instruction);
                }
            }
        }

        loop {
            run.machine.advance(RetryStatus::Applying, None)?;
            self.apply(run, ws, &plan, events)?;

            run.machine.advance(RetryStatus::Validating, None)?;
            events.message("Validating changes...")?;
            let attempt = run.machine.attempt();
            let result = self.validator.validate(ws).await;
            self.observer.validation_finished(attempt, &result);
            events.checkpoint()?;

            if result.success {
                events.message(format!("Validation passed: {}", result.summary()))?;
                run.machine
                    .advance(RetryStatus::Success, Some(result.summary().as_str()))?;
                run.last_validation = Some(result);
                return Ok(());
            }

            let max = run.machine.state().max_attempts;
            if !run.machine.can_retry() {
                let report = result.error_report();
                run.last_validation = Some(result);
                return Err(RetryFailure::ValidationExhausted {
                    attempts: attempt,
                    report,
                });
            }

            events.message(format!(
                "Validation failed on attempt {}/{}: {}",
                attempt,
                max,
                result.summary()
            ))?;
            run.machine
                .advance(RetryStatus::Fixing, Some(result.summary().as_str()))?;

            let attempt = run.machine.attempt();
            events.message(format!("Requesting fix (attempt {}/{})...", attempt, max))?;
            let contents = ws.read_files(&run.tracked)?;
            plan = match self
                .planner
                .fix(&contents, &result, instruction, attempt)
                .await
            {
                Ok(plan) => plan,
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Fix planning failed, continuing with empty plan");
                    events.message(format!("Warning: fix planning failed: {e}"))?;
                    ChangePlan::empty()
                }
            };
            run.planning_calls += 1;
            run.last_validation = Some(result);
            self.observer.plan_produced(attempt, plan.len());
            events.checkpoint()?;

            if plan.is_empty() {
                events.message("Fix plan was empty, re-validating unchanged workspace")?;
            }
        }
    }

    async fn initial_plan(
        &self,
        run: &mut RunState,
        contents: &FileContents,
        instruction: &str,
        events: &mut EventEmitter,
    ) -> Result<ChangePlan, RetryFailure> {
        events.message("Requesting change plan...")?;
        let plan = match self.planner.plan(contents, instruction).await {
            Ok(plan) => plan,
            Err(e) => {
                tracing::warn!(error = %e, "Planning failed, continuing with empty plan");
                events.message(format!("Warning: planning failed: {e}"))?;
                ChangePlan::empty()
            }
        };
        run.planning_calls += 1;
        self.observer.plan_produced(run.machine.attempt(), plan.len());
        events.checkpoint()?;
        Ok(plan)
    }

    fn apply(
        &self,
        run: &mut RunState,
        ws: &Workspace,
        plan: &ChangePlan,
        events: &mut EventEmitter,
    ) -> Result<(), RetryFailure> {
        if plan.is_empty() {
            return Ok(());
        }
        events.message(format!("Applying {} changes...", plan.len()))?;
        for edit in plan {
            let applied = self.applier.apply(ws, edit)?;
            if !applied.action.landed() {
                events.message(format!(
                    "Warning: skipped edit to {}: file does not exist",
                    edit.file
                ))?;
                events.checkpoint()?;
                continue;
            }
            run.edits_applied += 1;
            if !run.tracked.contains(&edit.file) {
                run.tracked.push(edit.file.clone());
            }
            events.edit(edit.file.as_str(), &edit.old_str, &edit.new_str)?;
            events.checkpoint()?;
        }
        Ok(())
    }
}
