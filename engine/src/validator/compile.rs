//! Out-of-process compiler check.
//!
//! Runs the configured command with the file's relative path appended as the
//! last argument, from the workspace root. A non-zero exit, a spawn failure
//! or a timeout all count as a compile error.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use super::report::CompileError;

/// Compiles a Python file without writing bytecode.
pub const PYTHON_COMPILE_SNIPPET: &str =
    "import sys; compile(open(sys.argv[1], 'rb').read(), sys.argv[1], 'exec')";

pub fn default_compile_command() -> Vec<String> {
    vec![
        "python3".to_string(),
        "-c".to_string(),
        PYTHON_COMPILE_SNIPPET.to_string(),
    ]
}

#[derive(Debug, Clone)]
pub struct CompileCheck {
    command: Vec<String>,
    timeout: Duration,
    output_max_bytes: usize,
}

impl CompileCheck {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self {
            command,
            timeout,
            output_max_bytes: 2048,
        }
    }

    pub fn with_output_limit(mut self, max_bytes: usize) -> Self {
        self.output_max_bytes = max_bytes;
        self
    }

    /// Check one file. `None` means it compiled.
    pub async fn check(&self, root: &Path, relative: &str) -> Option<CompileError> {
        let Some((program, args)) = self.command.split_first() else {
            return None;
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(relative)
            .current_dir(root)
            .env("PYTHONDONTWRITEBYTECODE", "1")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so a timeout takes any children down too.
        #[cfg(unix)]
        cmd.process_group(0);

        let failure = |message: String| {
            Some(CompileError {
                path: relative.to_string(),
                message,
            })
        };

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => None,
            Ok(Ok(output)) => {
                let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
                if text.trim().is_empty() {
                    text = String::from_utf8_lossy(&output.stdout).into_owned();
                }
                if text.trim().is_empty() {
                    text = format!("compiler exited with {}", output.status);
                }
                tracing::debug!(path = relative, exit = ?output.status.code(), "Compile check failed");
                failure(self.truncate(&text))
            }
            Ok(Err(e)) => {
                tracing::warn!(path = relative, command = %program, error = %e, "Compiler failed to start");
                failure(format!("failed to execute `{}`: {}", program, e))
            }
            Err(_) => {
                tracing::warn!(path = relative, timeout_secs = self.timeout.as_secs(), "Compile check timed out");
                failure(format!(
                    "compile check timed out after {}s",
                    self.timeout.as_secs()
                ))
            }
        }
    }

    fn truncate(&self, s: &str) -> String {
        if s.len() <= self.output_max_bytes {
            return s.to_string();
        }
        let mut end = self.output_max_bytes;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...\n[truncated at {} bytes]", &s[..end], s.len())
    }
}
