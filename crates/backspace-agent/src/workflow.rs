//! End-to-end request workflow.
//!
//! One [`CodingWorkflow::run`] call serves one request: access probe, clone,
//! discovery, the engine's retry loop, then commit / push / pull request.
//! Every step is narrated through the request's [`EventEmitter`] and the run
//! always ends with exactly one terminal event.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use backspace_engine::events::{EventEmitter, StreamClosed};
use backspace_engine::observer::{self, RunSummary, SharedObserver};
use backspace_engine::patch::{PatchApplier, PatchError};
use backspace_engine::planner::SharedPlanner;
use backspace_engine::retry::{RetryCoordinator, RetryFailure};
use backspace_engine::validator::{Validate, Validator};
use backspace_engine::workspace::{SourceFilter, Workspace, WorkspaceError};
use tracing::{error, info, warn};

use crate::config::AgentConfig;
use crate::git::{GitCli, GitError, SourceControl};
use crate::github::{GitHubClient, HostingApi, HostingError, PullRequest, RepoRef};
use crate::planner::RigPlanner;

const PR_TITLE_MAX_CHARS: usize = 200;
const PR_TITLE_PROMPT_CHARS: usize = 150;

/// One incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowRequest {
    pub repo_url: String,
    pub prompt: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Configuration(String),

    #[error("Only GitHub repositories are supported")]
    InvalidRepository(String),

    #[error("No write access to {repo}: {source}")]
    Access {
        repo: String,
        #[source]
        source: HostingError,
    },

    #[error("Failed to clone repository: {0}")]
    Clone(#[source] GitError),

    #[error("No source files found to modify")]
    NoSourceFiles,

    #[error("Planning failed: {0}")]
    Planning(String),

    #[error("Text to replace was not found in {file}")]
    PatternNotFound { file: String },

    #[error("Validation failed after {attempts} attempts:\n{report}")]
    Validation { attempts: u32, report: String },

    #[error("Failed to apply edit: {0}")]
    Patch(#[source] PatchError),

    /// Publishing problems after a successful push. Narrated, never terminal.
    #[error("Failed to create pull request: {0}")]
    Publish(String),

    #[error("Git command failed: {0}")]
    SourceControl(#[from] GitError),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("client disconnected")]
    Disconnected,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StreamClosed> for WorkflowError {
    fn from(_: StreamClosed) -> Self {
        Self::Disconnected
    }
}

impl From<RetryFailure> for WorkflowError {
    fn from(failure: RetryFailure) -> Self {
        match failure {
            RetryFailure::EmptyPlan | RetryFailure::NoFallbackTarget => {
                Self::Planning(failure.to_string())
            }
            RetryFailure::PatternNotFound { file } => Self::PatternNotFound { file },
            RetryFailure::ValidationExhausted { attempts, report } => {
                Self::Validation { attempts, report }
            }
            RetryFailure::Patch(e) => Self::Patch(e),
            RetryFailure::Workspace(e) => Self::Workspace(e),
            RetryFailure::Disconnected => Self::Disconnected,
            RetryFailure::IllegalTransition(e) => Self::Internal(e.to_string()),
        }
    }
}

// ── Publishing text ────────────────────────────────────────────────

pub fn commit_message(prompt: &str) -> String {
    format!("Automated changes: {prompt}")
}

/// PR title, shortened when the prompt is long.
pub fn pr_title(prompt: &str) -> String {
    let title = commit_message(prompt);
    if title.chars().count() <= PR_TITLE_MAX_CHARS {
        return title;
    }
    let head: String = prompt.chars().take(PR_TITLE_PROMPT_CHARS).collect();
    format!("Automated changes: {head}...")
}

pub fn pr_body(prompt: &str) -> String {
    format!(
        "This pull request implements the following changes:\n\n{prompt}\n\n---\n*Generated by Backspace Coding Agent*"
    )
}

pub fn branch_name(prefix: &str, unix_secs: i64) -> String {
    format!("{prefix}-{unix_secs}")
}

/// Terminal success payload.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Published {
    message: String,
    pr_url: Option<String>,
}

#[derive(Debug, Default)]
struct Progress {
    attempts: u32,
    edits_applied: usize,
}

/// Request workflow with injected collaborators.
pub struct CodingWorkflow {
    config: Arc<AgentConfig>,
    planner: Option<SharedPlanner>,
    validator: Arc<dyn Validate>,
    source_filter: SourceFilter,
    source_control: Arc<dyn SourceControl>,
    hosting: Arc<dyn HostingApi>,
    observer: SharedObserver,
    workspace_parent: Option<PathBuf>,
}

impl CodingWorkflow {
    /// `planner` is `None` when no planner credentials are configured; such a
    /// workflow answers every request with a configuration error.
    pub fn new(
        config: Arc<AgentConfig>,
        planner: Option<SharedPlanner>,
        source_control: Arc<dyn SourceControl>,
        hosting: Arc<dyn HostingApi>,
    ) -> Self {
        let validator: Arc<dyn Validate> = Arc::new(Validator::new(&config.validator));
        let source_filter = config.validator.source_filter();
        Self {
            config,
            planner,
            validator,
            source_filter,
            source_control,
            hosting,
            observer: observer::noop(),
            workspace_parent: None,
        }
    }

    /// Production collaborators: rig planner, git CLI, GitHub REST client.
    pub fn from_config(config: Arc<AgentConfig>) -> Result<Self> {
        let planner: Option<SharedPlanner> = match config.planner.api_key {
            Some(_) => Some(Arc::new(RigPlanner::from_endpoint(&config.planner)?)),
            None => {
                warn!("ANTHROPIC_API_KEY not set; requests will be rejected");
                None
            }
        };
        if config.github_token.is_none() {
            warn!("GITHUB_TOKEN not set; requests will be rejected");
        }
        let hosting = Arc::new(GitHubClient::new(
            config.github_api_url.clone(),
            config.github_token.clone(),
            config.branch_prefix.clone(),
        ));
        Ok(Self::new(
            config,
            planner,
            Arc::new(GitCli::default()),
            hosting,
        ))
    }

    pub fn with_validator(mut self, validator: Arc<dyn Validate>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Create workspaces under `parent` instead of the system temp dir.
    pub fn with_workspace_parent(mut self, parent: impl Into<PathBuf>) -> Self {
        self.workspace_parent = Some(parent.into());
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Serve one request to its terminal event.
    pub async fn run(&self, request: &WorkflowRequest, mut events: EventEmitter) -> RunSummary {
        let started = Instant::now();
        self.observer.run_started(&request.repo_url, &request.prompt);
        info!(repo = %request.repo_url, "Starting request");

        let mut progress = Progress::default();
        let outcome = self.execute(request, &mut events, &mut progress).await;

        let (success, message, pr_url) = match outcome {
            Ok(published) => (true, published.message, published.pr_url),
            Err(e) => {
                let message = e.to_string();
                error!(repo = %request.repo_url, error = %message, "Request failed");
                (false, message, None)
            }
        };

        let summary = RunSummary {
            success,
            message,
            attempts: progress.attempts,
            edits_applied: progress.edits_applied,
            pr_url,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        // Observers see the summary before the stream closes.
        self.observer.run_finished(&summary);

        let delivered = if summary.success {
            events.complete(summary.message.clone(), summary.pr_url.clone())
        } else {
            events.fail(summary.message.clone())
        };
        if !delivered {
            warn!(repo = %request.repo_url, "Client went away before the terminal event");
        }
        summary
    }

    async fn execute(
        &self,
        request: &WorkflowRequest,
        events: &mut EventEmitter,
        progress: &mut Progress,
    ) -> Result<Published, WorkflowError> {
        let token = self
            .config
            .github_token
            .as_ref()
            .ok_or_else(|| WorkflowError::Configuration("GitHub token not configured".into()))?;
        let planner = self.planner.clone().ok_or_else(|| {
            WorkflowError::Configuration("Anthropic API key not configured".into())
        })?;
        let repo = RepoRef::parse(&request.repo_url)
            .ok_or_else(|| WorkflowError::InvalidRepository(request.repo_url.clone()))?;

        events.message(format!("Checking write access to {repo}..."))?;
        self.hosting
            .check_write_access(&repo)
            .await
            .map_err(|source| WorkflowError::Access {
                repo: repo.slug(),
                source,
            })?;
        events.checkpoint()?;

        let ws = match &self.workspace_parent {
            Some(parent) => Workspace::create_in(parent)?,
            None => Workspace::create()?,
        };

        // ── Clone and discover ─────────────────────────────────────
        events.message(format!("Cloning {}...", request.repo_url))?;
        self.source_control
            .clone_repo(&repo.clone_url(), token, ws.root())
            .await
            .map_err(WorkflowError::Clone)?;
        self.source_control
            .configure_identity(ws.root(), &self.config.commit_identity)
            .await?;
        events.message("Repository cloned successfully")?;
        events.checkpoint()?;

        events.message("Analyzing codebase structure...")?;
        let files = ws.source_files(&self.source_filter);
        for file in &files {
            events.read(file.as_str())?;
        }
        events.message(format!("Found {} source files", files.len()))?;
        if files.is_empty() {
            return Err(WorkflowError::NoSourceFiles);
        }

        // ── Plan / apply / validate ────────────────────────────────
        let coordinator = RetryCoordinator::new(
            planner,
            self.validator.clone(),
            PatchApplier::new(self.config.not_found_policy),
            self.config.retry,
        )
        .with_observer(self.observer.clone());
        let report = coordinator
            .run(&ws, &files, &request.prompt, events)
            .await;
        progress.attempts = report.state.attempt;
        progress.edits_applied = report.edits_applied;
        if let Some(failure) = report.failure {
            return Err(failure.into());
        }

        // ── Publish ────────────────────────────────────────────────
        let published = self.publish(&ws, &repo, &request.prompt, events).await?;

        if let Err(e) = ws.close() {
            warn!(error = %e, "Failed to remove workspace");
        }
        Ok(published)
    }

    async fn publish(
        &self,
        ws: &Workspace,
        repo: &RepoRef,
        prompt: &str,
        events: &mut EventEmitter,
    ) -> Result<Published, WorkflowError> {
        let dir = ws.root();
        let branch = branch_name(&self.config.branch_prefix, chrono::Utc::now().timestamp());

        events.message("Creating git commit...")?;
        let record = self.source_control.checkout_branch(dir, &branch).await?;
        events.bash(record.command, record.output)?;
        let record = self.source_control.add_all(dir).await?;
        events.bash(record.command, record.output)?;
        let record = self.source_control.commit(dir, &commit_message(prompt)).await?;
        events.bash(record.command, record.output)?;

        match self.source_control.push(dir, &branch).await {
            Ok(record) => events.bash(record.command, record.output)?,
            Err(e) => {
                warn!(branch = %branch, error = %e, "Push failed");
                events.bash(format!("git push origin {branch}"), format!("Push failed: {e}"))?;
                events.message("Warning: push failed, skipping pull request")?;
                return Ok(Published {
                    message: format!(
                        "Changes completed successfully - committed to branch {branch} (push failed)"
                    ),
                    pr_url: None,
                });
            }
        }
        events.checkpoint()?;

        events.message("Creating pull request...")?;
        match self.open_pull_request(repo, &branch, prompt).await {
            Ok(url) => {
                events.message(format!("Pull request created: {url}"))?;
                Ok(Published {
                    message: "Changes completed successfully - PR created!".into(),
                    pr_url: Some(url),
                })
            }
            Err(e) => {
                warn!(branch = %branch, error = %e, "Degrading to branch-only result");
                events.message(format!("Warning: {e}"))?;
                events.message(format!("Changes were pushed to branch: {branch}"))?;
                Ok(Published {
                    message: format!("Changes completed successfully - pushed to branch {branch}"),
                    pr_url: None,
                })
            }
        }
    }

    async fn open_pull_request(
        &self,
        repo: &RepoRef,
        branch: &str,
        prompt: &str,
    ) -> Result<String, WorkflowError> {
        let base = self
            .hosting
            .default_branch(repo)
            .await
            .map_err(|e| WorkflowError::Publish(e.to_string()))?;
        let request = PullRequest {
            title: pr_title(prompt),
            head: format!("{}:{branch}", repo.owner),
            base,
            body: pr_body(prompt),
        };
        self.hosting
            .create_pull_request(repo, &request)
            .await
            .map_err(|e| WorkflowError::Publish(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pr_title_short_prompt() {
        assert_eq!(pr_title("add logging"), "Automated changes: add logging");
    }

    #[test]
    fn test_pr_title_truncates_long_prompt() {
        let prompt = "x".repeat(250);
        let title = pr_title(&prompt);
        assert_eq!(title, format!("Automated changes: {}...", "x".repeat(150)));
    }

    #[test]
    fn test_pr_title_boundary() {
        // "Automated changes: " is 19 characters.
        let prompt = "y".repeat(181);
        assert_eq!(pr_title(&prompt).chars().count(), 200);
        let prompt = "y".repeat(182);
        assert!(pr_title(&prompt).ends_with("..."));
    }

    #[test]
    fn test_pr_body() {
        assert_eq!(
            pr_body("do it"),
            "This pull request implements the following changes:\n\ndo it\n\n---\n*Generated by Backspace Coding Agent*"
        );
    }

    #[test]
    fn test_branch_name() {
        assert_eq!(branch_name("backspace", 1700000000), "backspace-1700000000");
    }

    #[test]
    fn test_retry_failure_mapping() {
        let e: WorkflowError = RetryFailure::PatternNotFound { file: "a.py".into() }.into();
        assert_eq!(e.to_string(), "Text to replace was not found in a.py");
        let e: WorkflowError = RetryFailure::ValidationExhausted {
            attempts: 3,
            report: "Syntax errors:\n- a.py\n".into(),
        }
        .into();
        assert!(matches!(e, WorkflowError::Validation { attempts: 3, .. }));
        let e: WorkflowError = RetryFailure::Disconnected.into();
        assert!(matches!(e, WorkflowError::Disconnected));
    }
}
