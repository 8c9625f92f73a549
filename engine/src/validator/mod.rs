//! Validator: structural and compiler checks over the whole workspace.
//!
//! Every candidate source file is checked on every pass, not only the files a
//! plan touched, so an edit cannot quietly break an unrelated file. Per file:
//!
//! ```text
//! tree-sitter parse (in process) → compiler command (out of process, timed)
//! ```
//!
//! Neither step executes the code being checked.

pub mod compile;
pub mod report;
pub mod syntax;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workspace::{SourceFilter, Workspace};

pub use compile::{default_compile_command, CompileCheck};
pub use report::{CompileError, ValidationResult};
pub use syntax::SyntaxCheck;

/// Anything that can judge a workspace.
///
/// The retry coordinator depends on this rather than on [`Validator`] so
/// tests can script pass/fail sequences.
#[async_trait]
pub trait Validate: Send + Sync {
    async fn validate(&self, ws: &Workspace) -> ValidationResult;
}

/// Validator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Extensions of candidate source files, without the dot.
    pub extensions: Vec<String>,
    /// Directory names never scanned.
    pub excluded_dirs: Vec<String>,
    /// Compiler command; the file path is appended. Empty disables the step.
    pub compile_command: Vec<String>,
    /// Per-file compiler timeout.
    pub compile_timeout_secs: u64,
    /// Compiler output kept per error.
    pub output_max_bytes: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        let filter = SourceFilter::default();
        Self {
            extensions: filter.extensions,
            excluded_dirs: filter.excluded_dirs,
            compile_command: default_compile_command(),
            compile_timeout_secs: 10,
            output_max_bytes: 2048,
        }
    }
}

impl ValidatorConfig {
    pub fn source_filter(&self) -> SourceFilter {
        SourceFilter {
            extensions: self.extensions.clone(),
            excluded_dirs: self.excluded_dirs.clone(),
        }
    }
}

/// The production validator.
#[derive(Debug, Clone)]
pub struct Validator {
    filter: SourceFilter,
    syntax: SyntaxCheck,
    compile: Option<CompileCheck>,
}

impl Validator {
    pub fn new(config: &ValidatorConfig) -> Self {
        let compile = if config.compile_command.is_empty() {
            None
        } else {
            Some(
                CompileCheck::new(
                    config.compile_command.clone(),
                    Duration::from_secs(config.compile_timeout_secs),
                )
                .with_output_limit(config.output_max_bytes),
            )
        };
        Self {
            filter: config.source_filter(),
            syntax: SyntaxCheck::new(),
            compile,
        }
    }

    pub fn filter(&self) -> &SourceFilter {
        &self.filter
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(&ValidatorConfig::default())
    }
}

#[async_trait]
impl Validate for Validator {
    async fn validate(&self, ws: &Workspace) -> ValidationResult {
        let files = ws.source_files(&self.filter);
        let mut syntax_errors = Vec::new();
        let mut compile_errors = Vec::new();

        for file in &files {
            let path = match ws.resolve(file) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!(path = %file, error = %e, "Skipping unresolvable file");
                    continue;
                }
            };

            match tokio::fs::read(&path).await {
                Ok(source) => {
                    if !self.syntax.is_valid(&path, &source) {
                        tracing::debug!(path = %file, "Syntax error");
                        syntax_errors.push(file.clone());
                    }
                }
                Err(e) => {
                    compile_errors.push(CompileError {
                        path: file.clone(),
                        message: format!("unreadable: {e}"),
                    });
                    continue;
                }
            }

            if let Some(compile) = &self.compile {
                if let Some(err) = compile.check(ws.root(), file).await {
                    compile_errors.push(err);
                }
            }
        }

        let result = ValidationResult::from_errors(syntax_errors, compile_errors, files.len());
        tracing::info!(
            files = result.files_checked,
            syntax_errors = result.syntax_errors.len(),
            compile_errors = result.compile_errors.len(),
            success = result.success,
            "Validation pass complete"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syntax_only() -> Validator {
        Validator::new(&ValidatorConfig {
            compile_command: Vec::new(),
            ..Default::default()
        })
    }

    fn ws_with(files: &[(&str, &str)]) -> Workspace {
        let ws = Workspace::create().unwrap();
        for (name, content) in files {
            let path = ws.root().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, content).unwrap();
        }
        ws
    }

    #[tokio::test]
    async fn test_clean_workspace_passes() {
        let ws = ws_with(&[("a.py", "x = 1\n"), ("pkg/b.py", "def f():\n    return 2\n")]);
        let result = syntax_only().validate(&ws).await;
        assert!(result.success);
        assert_eq!(result.files_checked, 2);
    }

    #[tokio::test]
    async fn test_untouched_broken_file_fails_whole_workspace() {
        let ws = ws_with(&[("good.py", "x = 1\n"), ("broken.py", "def f(:\n")]);
        let result = syntax_only().validate(&ws).await;
        assert!(!result.success);
        assert_eq!(result.syntax_errors, vec!["broken.py".to_string()]);
    }

    #[tokio::test]
    async fn test_broken_file_in_dot_directory_fails() {
        let ws = ws_with(&[("main.py", "x = 1\n")]);
        crate::patch::PatchApplier::default()
            .apply(&ws, &crate::plan::EditOperation::append(".ci/check.py", "def f(:\n"))
            .unwrap();
        let result = syntax_only().validate(&ws).await;
        assert!(!result.success);
        assert_eq!(result.files_checked, 2);
        assert_eq!(result.syntax_errors, vec![".ci/check.py".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_workspace_is_vacuously_valid() {
        let ws = ws_with(&[]);
        let result = syntax_only().validate(&ws).await;
        assert!(result.success);
        assert_eq!(result.files_checked, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compile_step_reports_per_file() {
        let ws = ws_with(&[("a.py", "x = 1\n"), ("b.py", "y = 2\n")]);
        let validator = Validator::new(&ValidatorConfig {
            compile_command: vec![
                "sh".into(),
                "-c".into(),
                "if [ \"$0\" = b.py ]; then echo nope >&2; exit 1; fi".into(),
            ],
            ..Default::default()
        });
        let result = validator.validate(&ws).await;
        assert!(!result.success);
        assert!(result.syntax_errors.is_empty());
        assert_eq!(result.compile_errors.len(), 1);
        assert_eq!(result.compile_errors[0].path, "b.py");
        assert!(result.compile_errors[0].message.contains("nope"));
    }
}
