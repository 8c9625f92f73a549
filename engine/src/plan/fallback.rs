//! Deterministic placeholder plan used when the planner returns nothing and
//! the empty-plan policy asks for a fallback instead of failing.

use super::{ChangePlan, EditOperation};

/// Build a single append edit against `target` that records the request.
///
/// The shape depends only on the instruction text, so the same request always
/// yields the same plan.
pub fn placeholder_plan(target: &str, instruction: &str) -> ChangePlan {
    let lowered = instruction.to_lowercase();
    let addition = if lowered.contains("comment") {
        format!(
            "\n{}\n# This comment was added by the Backspace Coding Agent\n# to fulfill the user's request\n",
            commented(instruction, "")
        )
    } else if lowered.contains("function") {
        format!(
            "\ndef auto_generated_function():\n    \"\"\"Function added to fulfill: {}\"\"\"\n    return True\n",
            docstring_safe(instruction)
        )
    } else {
        format!("\n{}\n", commented(instruction, "Automated addition for: "))
    };

    ChangePlan::new(vec![EditOperation::append(target, addition)])
}

/// Every line of `text` as a `#` comment, `prefix` on the first.
fn commented(text: &str, prefix: &str) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or_default();
    std::iter::once(format!("# {prefix}{first}"))
        .chain(lines.map(|line| format!("# {line}")))
        .map(|line| line.trim_end().to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// `text` made safe for a one-line `"""` docstring body.
fn docstring_safe(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}
