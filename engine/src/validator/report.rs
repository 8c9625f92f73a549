//! Validation result: the aggregated outcome of one validation pass.

use serde::{Deserialize, Serialize};

/// A file that failed the out-of-process compiler check.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CompileError {
    pub path: String,
    pub message: String,
}

/// Outcome of validating a whole workspace.
///
/// Recomputed from scratch on every pass. Error lists are sorted by path so
/// the result does not depend on the order files were checked in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub success: bool,
    pub syntax_errors: Vec<String>,
    pub compile_errors: Vec<CompileError>,
    #[serde(default)]
    pub files_checked: usize,
}

impl ValidationResult {
    pub fn from_errors(
        mut syntax_errors: Vec<String>,
        mut compile_errors: Vec<CompileError>,
        files_checked: usize,
    ) -> Self {
        syntax_errors.sort();
        syntax_errors.dedup();
        compile_errors.sort();
        Self {
            success: syntax_errors.is_empty() && compile_errors.is_empty(),
            syntax_errors,
            compile_errors,
            files_checked,
        }
    }

    /// A passing result over `files_checked` files.
    pub fn passed(files_checked: usize) -> Self {
        Self::from_errors(Vec::new(), Vec::new(), files_checked)
    }

    pub fn error_count(&self) -> usize {
        self.syntax_errors.len() + self.compile_errors.len()
    }

    /// One-line summary for logs and narration.
    pub fn summary(&self) -> String {
        if self.success {
            return format!("{} files valid", self.files_checked);
        }
        format!(
            "{} syntax errors, {} compile errors in {} files checked",
            self.syntax_errors.len(),
            self.compile_errors.len(),
            self.files_checked
        )
    }

    /// Multi-line listing of every error, used in fix requests and as the
    /// failure payload once retries are exhausted.
    pub fn error_report(&self) -> String {
        let mut out = String::new();
        if !self.syntax_errors.is_empty() {
            out.push_str("Syntax errors:\n");
            for path in &self.syntax_errors {
                out.push_str("- ");
                out.push_str(path);
                out.push('\n');
            }
        }
        if !self.compile_errors.is_empty() {
            out.push_str("Compile errors:\n");
            for err in &self.compile_errors {
                out.push_str(&format!("- {}: {}\n", err.path, err.message.trim()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_both_lists_empty() {
        assert!(ValidationResult::passed(3).success);
        assert!(!ValidationResult::from_errors(vec!["a.py".into()], vec![], 1).success);
        assert!(
            !ValidationResult::from_errors(
                vec![],
                vec![CompileError {
                    path: "a.py".into(),
                    message: "boom".into()
                }],
                1
            )
            .success
        );
    }

    #[test]
    fn test_order_independent() {
        let a = ValidationResult::from_errors(vec!["b.py".into(), "a.py".into()], vec![], 2);
        let b = ValidationResult::from_errors(vec!["a.py".into(), "b.py".into()], vec![], 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_error_report_lists_everything() {
        let result = ValidationResult::from_errors(
            vec!["bad.py".into()],
            vec![CompileError {
                path: "worse.py".into(),
                message: "SyntaxError: invalid syntax\n".into(),
            }],
            2,
        );
        let report = result.error_report();
        assert!(report.contains("- bad.py\n"));
        assert!(report.contains("- worse.py: SyntaxError: invalid syntax\n"));
        assert_eq!(result.error_count(), 2);
    }
}
