//! GitHub hosting API: write-access probe, default branch lookup, pull
//! request creation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Secret;

const GITHUB_PREFIX: &str = "https://github.com/";
const USER_AGENT: &str = "backspace-agent";

/// `owner/repo` parsed from a GitHub https URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    /// Accepts `https://github.com/<owner>/<repo>` with an optional `.git`
    /// suffix and trailing slash.
    pub fn parse(url: &str) -> Option<Self> {
        let rest = url.trim().strip_prefix(GITHUB_PREFIX)?;
        let rest = rest.strip_suffix('/').unwrap_or(rest);
        let rest = rest.strip_suffix(".git").unwrap_or(rest);
        let (owner, name) = rest.split_once('/')?;
        let valid = |s: &str| {
            !s.is_empty()
                && s != "."
                && s != ".."
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        };
        if !valid(owner) || !valid(name) {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    /// Canonical https clone URL.
    pub fn clone_url(&self) -> String {
        format!("{GITHUB_PREFIX}{}/{}.git", self.owner, self.name)
    }

    pub fn slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PullRequest {
    pub title: String,
    /// `owner:branch`.
    pub head: String,
    pub base: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum HostingError {
    #[error("GitHub token not configured")]
    MissingToken,

    #[error("GitHub request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub returned {status} for {operation}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
}

#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Fails unless the token can create branches in `repo`.
    async fn check_write_access(&self, repo: &RepoRef) -> Result<(), HostingError>;

    async fn default_branch(&self, repo: &RepoRef) -> Result<String, HostingError>;

    /// Open a pull request and return its URL.
    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &PullRequest,
    ) -> Result<String, HostingError>;
}

#[derive(Deserialize)]
struct RepoInfo {
    default_branch: String,
}

#[derive(Deserialize)]
struct RefObject {
    sha: String,
}

#[derive(Deserialize)]
struct GitRef {
    object: RefObject,
}

#[derive(Deserialize)]
struct PullResponse {
    html_url: String,
}

/// REST v3 client.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_url: String,
    token: Option<Secret>,
    probe_prefix: String,
}

impl GitHubClient {
    pub fn new(api_url: impl Into<String>, token: Option<Secret>, probe_prefix: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            probe_prefix: probe_prefix.into(),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, HostingError> {
        let token = self.token.as_ref().ok_or(HostingError::MissingToken)?;
        Ok(self
            .http
            .request(method, format!("{}{path}", self.api_url))
            .bearer_auth(token.expose())
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header("X-GitHub-Api-Version", "2022-11-28"))
    }

    async fn send(
        &self,
        operation: &'static str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, HostingError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "GitHub ok");
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HostingError::Status {
            operation,
            status: status.as_u16(),
            body,
        })
    }

    async fn head_sha(&self, repo: &RepoRef, branch: &str) -> Result<String, HostingError> {
        let path = format!("/repos/{}/{}/git/ref/heads/{branch}", repo.owner, repo.name);
        let builder = self.request(reqwest::Method::GET, &path)?;
        let git_ref: GitRef = self.send("get ref", builder).await?.json().await?;
        Ok(git_ref.object.sha)
    }
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn check_write_access(&self, repo: &RepoRef) -> Result<(), HostingError> {
        let base = self.default_branch(repo).await?;
        let sha = self.head_sha(repo, &base).await?;
        let probe = format!("{}-access-probe-{}", self.probe_prefix, uuid::Uuid::new_v4());

        let create = self
            .request(reqwest::Method::POST, &format!("/repos/{}/{}/git/refs", repo.owner, repo.name))?
            .json(&json!({ "ref": format!("refs/heads/{probe}"), "sha": sha }));
        self.send("create probe ref", create).await?;

        let delete = self.request(
            reqwest::Method::DELETE,
            &format!("/repos/{}/{}/git/refs/heads/{probe}", repo.owner, repo.name),
        )?;
        if let Err(e) = self.send("delete probe ref", delete).await {
            warn!(repo = %repo, branch = %probe, error = %e, "Failed to delete access probe ref");
        }
        info!(repo = %repo, "Write access confirmed");
        Ok(())
    }

    async fn default_branch(&self, repo: &RepoRef) -> Result<String, HostingError> {
        let builder = self.request(
            reqwest::Method::GET,
            &format!("/repos/{}/{}", repo.owner, repo.name),
        )?;
        let info: RepoInfo = self.send("get repository", builder).await?.json().await?;
        Ok(info.default_branch)
    }

    async fn create_pull_request(
        &self,
        repo: &RepoRef,
        request: &PullRequest,
    ) -> Result<String, HostingError> {
        let builder = self
            .request(
                reqwest::Method::POST,
                &format!("/repos/{}/{}/pulls", repo.owner, repo.name),
            )?
            .json(request);
        let pull: PullResponse = self.send("create pull request", builder).await?.json().await?;
        Ok(pull.html_url)
    }
}
