//! Planner prompts.
//!
//! Prompt versioning: bump `PROMPT_VERSION` whenever the text changes so a
//! logged plan can be traced back to the prompt that produced it.

use backspace_engine::planner::FileContents;
use backspace_engine::validator::ValidationResult;

/// Prompt version. Bump on any content change.
pub const PROMPT_VERSION: &str = "1.2.0";

/// System preamble for the planning model.
pub const PLANNER_PREAMBLE: &str = "\
You are a coding assistant that implements requested changes to a repository. \
You never explain your work in prose. You answer with a single JSON object \
describing literal text edits, and nothing else.";

const RESPONSE_FORMAT: &str = r#"RESPONSE FORMAT (JSON only):
{
    "edits": [
        {
            "file": "path/relative/to/repo.py",
            "old_str": "exact text to replace (or empty string to append)",
            "new_str": "new content"
        }
    ]
}

Examples:
- Add a function: {"file": "main.py", "old_str": "", "new_str": "\ndef my_function():\n    return True\n"}
- Add a comment: {"file": "main.py", "old_str": "", "new_str": "\n# This is my comment\n"}
- Replace text: {"file": "main.py", "old_str": "old text", "new_str": "new text"}"#;

fn files_section(files: &FileContents) -> String {
    let mut out = String::new();
    for (path, content) in files {
        out.push_str(&format!("\n=== {path} ===\n{content}\n"));
    }
    out
}

/// Initial planning request.
pub fn plan_prompt(files: &FileContents, instruction: &str) -> String {
    format!(
        "Task: {instruction}

Files:
{files}
RULES:
1. Always provide at least one edit
2. To append to a file (or create a new one): use old_str = \"\" (empty string)
3. To replace: old_str must be copied exactly from the file; only its first occurrence is replaced
4. If unsure, append to the end of the most relevant file

{RESPONSE_FORMAT}",
        files = files_section(files),
    )
}

/// Corrective request after a failed validation pass.
pub fn fix_prompt(
    files: &FileContents,
    report: &ValidationResult,
    instruction: &str,
    attempt: u32,
) -> String {
    format!(
        "Your previous edits for this task left the repository failing validation.

Original task: {instruction}
Fix attempt: {attempt}

{errors}
Current files:
{files}
RULES:
1. Make the minimum change needed to clear the errors above
2. Do not undo the requested change unless it is the cause of the errors
3. old_str must be copied exactly from the current file contents shown above
4. Return {{\"edits\": []}} only if no change can fix the errors

{RESPONSE_FORMAT}",
        errors = report.error_report(),
        files = files_section(files),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use backspace_engine::validator::CompileError;

    fn files() -> FileContents {
        let mut files = FileContents::new();
        files.insert("b.py".into(), "y = 2\n".into());
        files.insert("a.py".into(), "x = 1\n".into());
        files
    }

    #[test]
    fn test_plan_prompt_lists_files_in_order() {
        let prompt = plan_prompt(&files(), "add logging");
        assert!(prompt.contains("Task: add logging"));
        let a = prompt.find("=== a.py ===\nx = 1\n").unwrap();
        let b = prompt.find("=== b.py ===\ny = 2\n").unwrap();
        assert!(a < b);
        assert!(prompt.contains("\"edits\""));
    }

    #[test]
    fn test_fix_prompt_includes_errors_and_attempt() {
        let report = ValidationResult::from_errors(
            vec!["a.py".into()],
            vec![CompileError {
                path: "b.py".into(),
                message: "SyntaxError: bad".into(),
            }],
            2,
        );
        let prompt = fix_prompt(&files(), &report, "add logging", 2);
        assert!(prompt.contains("Fix attempt: 2"));
        assert!(prompt.contains("- a.py"));
        assert!(prompt.contains("- b.py: SyntaxError: bad"));
        assert!(prompt.contains("minimum change"));
    }
}
