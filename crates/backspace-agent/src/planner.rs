//! LLM-backed planner.
//!
//! Talks to any OpenAI-compatible completions endpoint through rig; the
//! default configuration points at Anthropic's compatibility endpoint.

use anyhow::{Context, Result};
use async_trait::async_trait;
use backspace_engine::plan::{parse_plan, ChangePlan};
use backspace_engine::planner::{FileContents, Planner, PlanningError};
use backspace_engine::validator::ValidationResult;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;

use crate::config::PlannerEndpoint;
use crate::prompts;

/// Type alias for agents built from OpenAI-compatible endpoints.
pub type OaiAgent = Agent<openai::completion::CompletionModel>;

pub struct RigPlanner {
    agent: OaiAgent,
    model: String,
}

impl RigPlanner {
    /// Build the planning agent. Fails when no API key is configured.
    pub fn from_endpoint(endpoint: &PlannerEndpoint) -> Result<Self> {
        let api_key = endpoint
            .api_key
            .as_ref()
            .context("Anthropic API key not configured")?;

        let client = openai::CompletionsClient::builder()
            .api_key(api_key.expose())
            .base_url(&endpoint.url)
            .build()
            .context("Failed to build planner CompletionsClient")?;

        let agent = client
            .agent(&endpoint.model)
            .name("planner")
            .preamble(prompts::PLANNER_PREAMBLE)
            .temperature(endpoint.temperature)
            .max_tokens(endpoint.max_tokens)
            .build();

        Ok(Self {
            agent,
            model: endpoint.model.clone(),
        })
    }

    async fn request(&self, prompt: String) -> Result<ChangePlan, PlanningError> {
        tracing::info!(
            model = %self.model,
            prompt_version = prompts::PROMPT_VERSION,
            prompt_chars = prompt.len(),
            "Requesting change plan"
        );
        let response: String = self
            .agent
            .prompt(prompt.as_str())
            .await
            .map_err(|e| PlanningError::Request(e.to_string()))?;
        plan_from_response(&response)
    }
}

/// Turn raw model output into a plan.
pub fn plan_from_response(response: &str) -> Result<ChangePlan, PlanningError> {
    match parse_plan(response) {
        Ok(parsed) => {
            tracing::info!(
                strategy = %parsed.strategy,
                edits = parsed.plan.len(),
                "Parsed change plan"
            );
            Ok(parsed.plan)
        }
        Err(e) => {
            let head: String = response.chars().take(200).collect();
            tracing::warn!(error = %e, response_head = %head, "Unparsable planner response");
            Err(e.into())
        }
    }
}

#[async_trait]
impl Planner for RigPlanner {
    async fn plan(
        &self,
        files: &FileContents,
        instruction: &str,
    ) -> Result<ChangePlan, PlanningError> {
        self.request(prompts::plan_prompt(files, instruction)).await
    }

    async fn fix(
        &self,
        files: &FileContents,
        report: &ValidationResult,
        instruction: &str,
        attempt: u32,
    ) -> Result<ChangePlan, PlanningError> {
        self.request(prompts::fix_prompt(files, report, instruction, attempt))
            .await
    }
}
