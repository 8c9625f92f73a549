//! Backspace coding agent.
//!
//! Outer surfaces around `backspace-engine`: configuration, the LLM planner,
//! git and GitHub collaborators, the request workflow, the HTTP/SSE server
//! and a stream probe client.

pub mod config;
pub mod git;
pub mod github;
pub mod planner;
pub mod probe;
pub mod prompts;
pub mod server;
pub mod telemetry;
pub mod workflow;

pub use config::{AgentConfig, CommitIdentity, PlannerEndpoint, Secret};
pub use git::{CommandRecord, GitCli, GitError, SourceControl};
pub use github::{GitHubClient, HostingApi, HostingError, PullRequest, RepoRef};
pub use planner::RigPlanner;
pub use probe::{Probe, ProbeReport};
pub use server::{router, AppState};
pub use telemetry::TracingObserver;
pub use workflow::{CodingWorkflow, WorkflowError, WorkflowRequest};
