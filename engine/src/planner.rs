//! Planner collaborator interface.
//!
//! The engine never talks to a model itself. Whatever produces change plans
//! (an LLM client in production, a script in tests) implements [`Planner`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::plan::{ChangePlan, PlanParseError};
use crate::validator::ValidationResult;

/// Relative path → file content, sorted by path.
pub type FileContents = BTreeMap<String, String>;

#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("planner is not configured: {0}")]
    NotConfigured(String),

    #[error("planner request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Parse(#[from] PlanParseError),
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// Produce the initial plan for `instruction`. May be empty.
    async fn plan(&self, files: &FileContents, instruction: &str)
        -> Result<ChangePlan, PlanningError>;

    /// Produce a corrective plan that clears the errors in `report`.
    /// `attempt` is the attempt number the fix will be validated as.
    async fn fix(
        &self,
        files: &FileContents,
        report: &ValidationResult,
        instruction: &str,
        attempt: u32,
    ) -> Result<ChangePlan, PlanningError>;
}

pub type SharedPlanner = Arc<dyn Planner>;
