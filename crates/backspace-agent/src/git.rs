//! Source control over the `git` CLI.
//!
//! Every publishing step returns a [`CommandRecord`]: the command text shown
//! to the client and the output it produced. Credentials are embedded only in
//! the clone URL and scrubbed from anything that leaves this module.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{CommitIdentity, Secret};

/// Backoff delays for transient git retries (milliseconds).
const RETRY_DELAYS_MS: &[u64] = &[100, 500, 2000];
const MAX_RETRIES: u32 = 3;

/// A command as narrated to the client, with its captured output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRecord {
    pub command: String,
    pub output: String,
}

impl CommandRecord {
    fn new(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: output.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed: {stderr}")]
    Failed { command: String, stderr: String },

    #[error("no changes to commit")]
    NothingToCommit,
}

/// Operations the workflow needs from version control.
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// Clone `repo_url` into the empty directory `dest` using `token`.
    async fn clone_repo(&self, repo_url: &str, token: &Secret, dest: &Path)
        -> Result<(), GitError>;

    async fn configure_identity(
        &self,
        dir: &Path,
        identity: &CommitIdentity,
    ) -> Result<(), GitError>;

    async fn checkout_branch(&self, dir: &Path, branch: &str) -> Result<CommandRecord, GitError>;

    async fn add_all(&self, dir: &Path) -> Result<CommandRecord, GitError>;

    async fn commit(&self, dir: &Path, message: &str) -> Result<CommandRecord, GitError>;

    async fn push(&self, dir: &Path, branch: &str) -> Result<CommandRecord, GitError>;
}

/// Insert `token` as the credential of an https clone URL.
pub fn authenticated_url(repo_url: &str, token: &Secret) -> String {
    match repo_url.strip_prefix("https://") {
        Some(rest) => format!("https://x-access-token:{}@{rest}", token.expose()),
        None => repo_url.to_string(),
    }
}

/// Replace every occurrence of `token` in `text`.
pub fn redact(text: &str, token: Option<&Secret>) -> String {
    match token {
        Some(t) if !t.expose().is_empty() => text.replace(t.expose(), "***"),
        _ => text.to_string(),
    }
}

/// Shell-style rendering of one argument for narration.
fn quoted(arg: &str) -> String {
    shlex::try_quote(arg)
        .map(|q| q.into_owned())
        .unwrap_or_else(|_| arg.to_string())
}

/// `git` subprocess implementation of [`SourceControl`].
#[derive(Debug, Clone)]
pub struct GitCli {
    bin: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self { bin: "git".into() }
    }
}

impl GitCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    /// Run git in `dir`, retrying on transient index lock failures.
    /// Returns trimmed stdout.
    async fn run(
        &self,
        dir: &Path,
        args: &[&str],
        secret: Option<&Secret>,
    ) -> Result<String, GitError> {
        let command = redact(&format!("git {}", args.join(" ")), secret);
        for attempt in 0..=MAX_RETRIES {
            let output = tokio::process::Command::new(&self.bin)
                .args(args)
                .current_dir(dir)
                .env("GIT_TERMINAL_PROMPT", "0")
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|source| GitError::Spawn {
                    command: command.clone(),
                    source,
                })?;

            if output.status.success() {
                debug!(command = %command, "git ok");
                return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
            }

            let stderr = redact(String::from_utf8_lossy(&output.stderr).trim(), secret);
            let is_transient = stderr.contains("index.lock") || stderr.contains("Unable to create");
            if attempt < MAX_RETRIES && is_transient {
                let delay = RETRY_DELAYS_MS
                    .get(attempt as usize)
                    .copied()
                    .unwrap_or(2000);
                warn!(
                    attempt = attempt + 1,
                    delay_ms = delay,
                    "Transient git failure, retrying: {stderr}"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                continue;
            }
            return Err(GitError::Failed { command, stderr });
        }
        Err(GitError::Failed {
            command,
            stderr: "retries exhausted".into(),
        })
    }

    /// True when the index holds staged changes.
    async fn has_staged_changes(&self, dir: &Path) -> Result<bool, GitError> {
        let command = "git diff --cached --quiet".to_string();
        let status = tokio::process::Command::new(&self.bin)
            .args(["diff", "--cached", "--quiet"])
            .current_dir(dir)
            .status()
            .await
            .map_err(|source| GitError::Spawn { command, source })?;
        // Exit code 1 means a diff exists.
        Ok(!status.success())
    }
}

#[async_trait]
impl SourceControl for GitCli {
    async fn clone_repo(
        &self,
        repo_url: &str,
        token: &Secret,
        dest: &Path,
    ) -> Result<(), GitError> {
        let url = authenticated_url(repo_url, token);
        self.run(dest, &["clone", "--quiet", &url, "."], Some(token))
            .await?;
        Ok(())
    }

    async fn configure_identity(
        &self,
        dir: &Path,
        identity: &CommitIdentity,
    ) -> Result<(), GitError> {
        self.run(dir, &["config", "user.name", &identity.name], None)
            .await?;
        self.run(dir, &["config", "user.email", &identity.email], None)
            .await?;
        Ok(())
    }

    async fn checkout_branch(&self, dir: &Path, branch: &str) -> Result<CommandRecord, GitError> {
        self.run(dir, &["checkout", "--quiet", "-b", branch], None)
            .await?;
        Ok(CommandRecord::new(
            format!("git checkout -b {branch}"),
            format!("Switched to a new branch '{branch}'"),
        ))
    }

    async fn add_all(&self, dir: &Path) -> Result<CommandRecord, GitError> {
        let output = self.run(dir, &["add", "."], None).await?;
        Ok(CommandRecord::new("git add .", output))
    }

    async fn commit(&self, dir: &Path, message: &str) -> Result<CommandRecord, GitError> {
        if !self.has_staged_changes(dir).await? {
            return Err(GitError::NothingToCommit);
        }
        self.run(dir, &["commit", "--quiet", "-m", message], None)
            .await?;
        let summary = self.run(dir, &["log", "-1", "--oneline"], None).await?;
        Ok(CommandRecord::new(
            format!("git commit -m {}", quoted(message)),
            summary,
        ))
    }

    async fn push(&self, dir: &Path, branch: &str) -> Result<CommandRecord, GitError> {
        self.run(dir, &["push", "--quiet", "origin", branch], None)
            .await?;
        Ok(CommandRecord::new(
            format!("git push origin {branch}"),
            format!("Pushed branch '{branch}' to remote"),
        ))
    }
}
