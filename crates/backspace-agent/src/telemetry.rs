//! Structured telemetry for agent runs.
//!
//! [`TracingObserver`] turns workflow hooks into `tracing` events and keeps
//! process-wide counters served on `/stats`.

use std::sync::atomic::{AtomicU64, Ordering};

use backspace_engine::observer::{RunSummary, WorkflowObserver};
use backspace_engine::validator::ValidationResult;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub plans_produced: u64,
    pub validations_failed: u64,
}

#[derive(Debug, Default)]
pub struct TracingObserver {
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    plans_produced: AtomicU64,
    validations_failed: AtomicU64,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            plans_produced: self.plans_produced.load(Ordering::Relaxed),
            validations_failed: self.validations_failed.load(Ordering::Relaxed),
        }
    }
}

impl WorkflowObserver for TracingObserver {
    fn run_started(&self, repo_url: &str, instruction: &str) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
        info!(
            repo = %repo_url,
            instruction_chars = instruction.chars().count(),
            "Run started"
        );
    }

    fn plan_produced(&self, attempt: u32, edits: usize) {
        self.plans_produced.fetch_add(1, Ordering::Relaxed);
        info!(attempt, edits, "Plan produced");
    }

    fn validation_finished(&self, attempt: u32, result: &ValidationResult) {
        if result.success {
            info!(attempt, files = result.files_checked, "Validation passed");
        } else {
            self.validations_failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                attempt,
                syntax_errors = result.syntax_errors.len(),
                compile_errors = result.compile_errors.len(),
                "Validation failed"
            );
        }
    }

    fn run_finished(&self, summary: &RunSummary) {
        if summary.success {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
        info!(
            success = summary.success,
            attempts = summary.attempts,
            edits = summary.edits_applied,
            elapsed_ms = summary.elapsed_ms,
            pr_url = summary.pr_url.as_deref().unwrap_or(""),
            "Run finished: {}",
            summary.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let obs = TracingObserver::new();
        obs.run_started("https://github.com/o/r", "do it");
        obs.plan_produced(1, 2);
        obs.validation_finished(1, &ValidationResult::from_errors(vec!["a.py".into()], vec![], 1));
        obs.validation_finished(2, &ValidationResult::passed(1));
        obs.run_finished(&RunSummary {
            success: true,
            message: "done".into(),
            attempts: 2,
            edits_applied: 2,
            pr_url: None,
            elapsed_ms: 5,
        });

        let snap = obs.snapshot();
        assert_eq!(snap.runs_started, 1);
        assert_eq!(snap.runs_succeeded, 1);
        assert_eq!(snap.runs_failed, 0);
        assert_eq!(snap.plans_produced, 1);
        assert_eq!(snap.validations_failed, 1);
    }
}
