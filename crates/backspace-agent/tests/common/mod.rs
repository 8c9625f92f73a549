//! Shared fakes for agent integration tests. No network, no real git.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use backspace_agent::config::{AgentConfig, CommitIdentity, Secret};
use backspace_agent::git::{CommandRecord, GitError, SourceControl};
use backspace_agent::github::{HostingApi, HostingError, PullRequest, RepoRef};
use backspace_agent::workflow::{CodingWorkflow, WorkflowRequest};
use backspace_engine::events::{EventEmitter, ProgressEvent};
use backspace_engine::observer::RunSummary;
use backspace_engine::plan::{ChangePlan, EditOperation};
use backspace_engine::planner::{FileContents, Planner, PlanningError, SharedPlanner};
use backspace_engine::validator::ValidationResult;

pub const REPO_URL: &str = "https://github.com/octo/hello";
pub const PR_URL: &str = "https://github.com/octo/hello/pull/7";

// ── Source control ─────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeGit {
    pub seed: Vec<(String, String)>,
    pub fail_clone: bool,
    pub fail_push: bool,
    pub calls: Mutex<Vec<String>>,
}

impl FakeGit {
    pub fn seeded(files: &[(&str, &str)]) -> Self {
        Self {
            seed: files
                .iter()
                .map(|(p, c)| (p.to_string(), c.to_string()))
                .collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl SourceControl for FakeGit {
    async fn clone_repo(&self, repo_url: &str, token: &Secret, dest: &Path) -> Result<(), GitError> {
        assert!(!repo_url.contains(token.expose()));
        self.record(format!("clone {repo_url}"));
        if self.fail_clone {
            return Err(GitError::Failed {
                command: "git clone".into(),
                stderr: "fatal: repository not found".into(),
            });
        }
        for (path, content) in &self.seed {
            let full = dest.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, content).unwrap();
        }
        Ok(())
    }

    async fn configure_identity(&self, _dir: &Path, identity: &CommitIdentity) -> Result<(), GitError> {
        self.record(format!("identity {}", identity.email));
        Ok(())
    }

    async fn checkout_branch(&self, _dir: &Path, branch: &str) -> Result<CommandRecord, GitError> {
        self.record(format!("checkout {branch}"));
        Ok(CommandRecord {
            command: format!("git checkout -b {branch}"),
            output: format!("Switched to a new branch '{branch}'"),
        })
    }

    async fn add_all(&self, _dir: &Path) -> Result<CommandRecord, GitError> {
        self.record("add".into());
        Ok(CommandRecord {
            command: "git add .".into(),
            output: String::new(),
        })
    }

    async fn commit(&self, _dir: &Path, message: &str) -> Result<CommandRecord, GitError> {
        self.record(format!("commit {message}"));
        Ok(CommandRecord {
            command: format!("git commit -m '{message}'"),
            output: format!("abc1234 {message}"),
        })
    }

    async fn push(&self, _dir: &Path, branch: &str) -> Result<CommandRecord, GitError> {
        self.record(format!("push {branch}"));
        if self.fail_push {
            return Err(GitError::Failed {
                command: format!("git push origin {branch}"),
                stderr: "remote rejected".into(),
            });
        }
        Ok(CommandRecord {
            command: format!("git push origin {branch}"),
            output: format!("Pushed branch '{branch}' to remote"),
        })
    }
}

// ── Hosting ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeHosting {
    pub deny_access: bool,
    pub fail_pr: bool,
    pub access_checks: AtomicU32,
    pub prs: Mutex<Vec<PullRequest>>,
}

impl FakeHosting {
    pub fn prs(&self) -> Vec<PullRequest> {
        self.prs.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostingApi for FakeHosting {
    async fn check_write_access(&self, _repo: &RepoRef) -> Result<(), HostingError> {
        self.access_checks.fetch_add(1, Ordering::SeqCst);
        if self.deny_access {
            return Err(HostingError::Status {
                operation: "create probe ref",
                status: 403,
                body: "Resource not accessible by integration".into(),
            });
        }
        Ok(())
    }

    async fn default_branch(&self, _repo: &RepoRef) -> Result<String, HostingError> {
        Ok("main".into())
    }

    async fn create_pull_request(
        &self,
        _repo: &RepoRef,
        request: &PullRequest,
    ) -> Result<String, HostingError> {
        self.prs.lock().unwrap().push(request.clone());
        if self.fail_pr {
            return Err(HostingError::Status {
                operation: "create pull request",
                status: 422,
                body: "Validation Failed".into(),
            });
        }
        Ok(PR_URL.into())
    }
}

// ── Planner ────────────────────────────────────────────────────────

/// Returns queued plans in order, then empty plans.
pub struct QueuePlanner {
    plans: Mutex<VecDeque<ChangePlan>>,
    pub calls: AtomicU32,
}

impl QueuePlanner {
    pub fn new(plans: Vec<ChangePlan>) -> Self {
        Self {
            plans: Mutex::new(plans.into()),
            calls: AtomicU32::new(0),
        }
    }

    fn next(&self) -> ChangePlan {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.plans.lock().unwrap().pop_front().unwrap_or_default()
    }
}

#[async_trait]
impl Planner for QueuePlanner {
    async fn plan(&self, _files: &FileContents, _instruction: &str) -> Result<ChangePlan, PlanningError> {
        Ok(self.next())
    }

    async fn fix(
        &self,
        _files: &FileContents,
        _report: &ValidationResult,
        _instruction: &str,
        _attempt: u32,
    ) -> Result<ChangePlan, PlanningError> {
        Ok(self.next())
    }
}

pub fn append_plan(file: &str, text: &str) -> ChangePlan {
    ChangePlan::new(vec![EditOperation::append(file, text)])
}

// ── Wiring ─────────────────────────────────────────────────────────

pub fn seed_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("app.py", "def main():\n    return 1\n"),
        ("pkg/util.py", "X = 1\n"),
        ("README.md", "# hello\n"),
    ]
}

/// Config with a token and no external compiler.
pub fn test_config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.github_token = Some(Secret::new("ghp_test_token"));
    config.planner.api_key = Some(Secret::new("sk-test"));
    config.validator.compile_command = Vec::new();
    config.heartbeat_interval_secs = 3600;
    config
}

pub fn workflow(
    config: AgentConfig,
    planner: Option<Arc<QueuePlanner>>,
    git: Arc<FakeGit>,
    hosting: Arc<FakeHosting>,
    parent: &Path,
) -> CodingWorkflow {
    let planner = planner.map(|p| p as SharedPlanner);
    CodingWorkflow::new(Arc::new(config), planner, git, hosting).with_workspace_parent(parent)
}

pub fn request(prompt: &str) -> WorkflowRequest {
    WorkflowRequest {
        repo_url: REPO_URL.into(),
        prompt: prompt.into(),
    }
}

/// Run to completion and collect every emitted event.
pub async fn run_collect(
    workflow: &CodingWorkflow,
    request: &WorkflowRequest,
) -> (RunSummary, Vec<ProgressEvent>) {
    let (events, mut rx) = EventEmitter::channel(Duration::from_secs(3600));
    let summary = workflow.run(request, events).await;
    let mut all = Vec::new();
    while let Ok(event) = rx.try_recv() {
        all.push(event);
    }
    (summary, all)
}

pub fn messages(events: &[ProgressEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::AiMessage { message } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path).unwrap().next().is_none()
}
