use std::fmt;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use backspace_engine::patch::NotFoundPolicy;
use backspace_engine::retry::{EmptyPlanPolicy, RetryConfig};
use backspace_engine::validator::ValidatorConfig;
use serde::Deserialize;

/// A credential that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

/// OpenAI-compatible completions endpoint used for planning.
#[derive(Debug, Clone)]
pub struct PlannerEndpoint {
    pub url: String,
    pub model: String,
    pub api_key: Option<Secret>,
    pub max_tokens: u64,
    pub temperature: f64,
}

/// Commit author used for automated commits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

impl Default for CommitIdentity {
    fn default() -> Self {
        Self {
            name: "Coding Agent".into(),
            email: "backspace-agent@users.noreply.github.com".into(),
        }
    }
}

/// Top-level agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub github_token: Option<Secret>,
    pub github_api_url: String,
    pub planner: PlannerEndpoint,
    /// Address the HTTP server binds to.
    pub bind: String,
    pub retry: RetryConfig,
    pub not_found_policy: NotFoundPolicy,
    pub validator: ValidatorConfig,
    pub heartbeat_interval_secs: u64,
    pub branch_prefix: String,
    pub commit_identity: CommitIdentity,
}

fn secret_from_env(var: &str) -> Option<Secret> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(Secret::new)
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            github_token: secret_from_env("GITHUB_TOKEN"),
            github_api_url: std::env::var("BACKSPACE_GITHUB_API_URL")
                .unwrap_or_else(|_| "https://api.github.com".into()),
            planner: PlannerEndpoint {
                url: std::env::var("BACKSPACE_PLANNER_URL")
                    .unwrap_or_else(|_| "https://api.anthropic.com/v1".into()),
                model: std::env::var("BACKSPACE_PLANNER_MODEL")
                    .unwrap_or_else(|_| "claude-3-5-sonnet-20241022".into()),
                api_key: secret_from_env("ANTHROPIC_API_KEY"),
                max_tokens: 4000,
                temperature: 0.2,
            },
            bind: std::env::var("BACKSPACE_BIND").unwrap_or_else(|_| "0.0.0.0:8000".into()),
            retry: RetryConfig::default(),
            not_found_policy: NotFoundPolicy::default(),
            validator: ValidatorConfig::default(),
            heartbeat_interval_secs: 2,
            branch_prefix: "backspace".into(),
            commit_identity: CommitIdentity::default(),
        }
    }
}

/// Optional TOML overrides. Secrets are environment-only.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub max_attempts: Option<u32>,
    pub not_found_policy: Option<NotFoundPolicy>,
    pub empty_plan_policy: Option<EmptyPlanPolicy>,
    pub heartbeat_interval_secs: Option<u64>,
    pub validator: Option<ValidatorConfig>,
    pub branch_prefix: Option<String>,
    pub commit_identity: Option<CommitIdentity>,
    pub planner_url: Option<String>,
    pub planner_model: Option<String>,
    pub planner_max_tokens: Option<u64>,
    pub planner_temperature: Option<f64>,
    pub github_api_url: Option<String>,
    pub bind: Option<String>,
}

impl AgentConfig {
    /// Environment defaults, overridden by `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file: ConfigFile = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config TOML {}", path.display()))?;
            config.apply(file);
        }
        Ok(config)
    }

    pub fn apply(&mut self, file: ConfigFile) {
        if let Some(v) = file.max_attempts {
            self.retry.max_attempts = v.max(1);
        }
        if let Some(v) = file.empty_plan_policy {
            self.retry.empty_plan_policy = v;
        }
        if let Some(v) = file.not_found_policy {
            self.not_found_policy = v;
        }
        if let Some(v) = file.heartbeat_interval_secs {
            self.heartbeat_interval_secs = v;
        }
        if let Some(v) = file.validator {
            self.validator = v;
        }
        if let Some(v) = file.branch_prefix {
            self.branch_prefix = v;
        }
        if let Some(v) = file.commit_identity {
            self.commit_identity = v;
        }
        if let Some(v) = file.planner_url {
            self.planner.url = v;
        }
        if let Some(v) = file.planner_model {
            self.planner.model = v;
        }
        if let Some(v) = file.planner_max_tokens {
            self.planner.max_tokens = v;
        }
        if let Some(v) = file.planner_temperature {
            self.planner.temperature = v;
        }
        if let Some(v) = file.github_api_url {
            self.github_api_url = v;
        }
        if let Some(v) = file.bind {
            self.bind = v;
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.empty_plan_policy, EmptyPlanPolicy::Fail);
        assert_eq!(config.not_found_policy, NotFoundPolicy::Strict);
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(2));
        assert_eq!(config.validator.compile_timeout_secs, 10);
        assert_eq!(config.planner.max_tokens, 4000);
        assert_eq!(config.commit_identity.name, "Coding Agent");
    }

    #[test]
    fn test_toml_overrides() {
        let file: ConfigFile = toml::from_str(
            r#"
max_attempts = 5
not_found_policy = "lenient"
empty_plan_policy = "placeholder"
branch_prefix = "bot"

[validator]
extensions = ["py", "pyi"]
compile_timeout_secs = 3

[commit_identity]
name = "Bot"
email = "bot@example.com"
"#,
        )
        .unwrap();

        let mut config = AgentConfig::default();
        config.apply(file);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.not_found_policy, NotFoundPolicy::Lenient);
        assert_eq!(config.retry.empty_plan_policy, EmptyPlanPolicy::Placeholder);
        assert_eq!(config.branch_prefix, "bot");
        assert_eq!(config.validator.extensions, vec!["py", "pyi"]);
        assert_eq!(config.validator.compile_timeout_secs, 3);
        // Unset validator fields keep their defaults.
        assert!(!config.validator.compile_command.is_empty());
        assert_eq!(config.commit_identity.email, "bot@example.com");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!(toml::from_str::<ConfigFile>("github_token = \"nope\"").is_err());
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let mut config = AgentConfig::default();
        config.apply(ConfigFile {
            max_attempts: Some(0),
            ..Default::default()
        });
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn test_secret_debug_redacted() {
        let s = Secret::new("ghp_supersecret");
        assert_eq!(format!("{s:?}"), "Secret(***)");
        assert_eq!(s.expose(), "ghp_supersecret");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("backspace.toml");
        std::fs::write(&path, "heartbeat_interval_secs = 7\n").unwrap();
        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.heartbeat_interval_secs, 7);
    }
}
