//! Optional telemetry hooks.
//!
//! Injected at construction; every method has an empty default so an
//! implementation only overrides what it records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::validator::ValidationResult;

/// Final numbers for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub success: bool,
    pub message: String,
    pub attempts: u32,
    pub edits_applied: usize,
    pub pr_url: Option<String>,
    pub elapsed_ms: u64,
}

pub trait WorkflowObserver: Send + Sync {
    fn run_started(&self, _repo_url: &str, _instruction: &str) {}

    fn plan_produced(&self, _attempt: u32, _edits: usize) {}

    fn validation_finished(&self, _attempt: u32, _result: &ValidationResult) {}

    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Observer that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl WorkflowObserver for NoopObserver {}

pub type SharedObserver = Arc<dyn WorkflowObserver>;

/// Shared no-op observer.
pub fn noop() -> SharedObserver {
    Arc::new(NoopObserver)
}
