//! Progress event schema.
//!
//! One JSON object per event, discriminated by `type`. The type strings are
//! part of the public wire contract and must not change.

use serde::{Deserialize, Serialize};

/// Maximum characters kept in an edit preview.
pub const PREVIEW_MAX_CHARS: usize = 100;

/// A single observable step of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    /// Human-readable narration.
    #[serde(rename = "AI Message")]
    AiMessage { message: String },

    /// A file was inspected.
    #[serde(rename = "Tool: Read")]
    ToolRead { filepath: String },

    /// An edit was applied. Strings are previews, never the full edit text.
    #[serde(rename = "Tool: Edit")]
    ToolEdit {
        filepath: String,
        old_str: String,
        new_str: String,
    },

    /// A version-control command ran.
    #[serde(rename = "Tool: Bash")]
    ToolBash { command: String, output: String },

    /// Keep-alive with no semantic content.
    #[serde(rename = "heartbeat")]
    Heartbeat { message: String },

    /// Terminal failure.
    #[serde(rename = "error")]
    Error { message: String },

    /// Terminal success. No `pr_url` means the branch was pushed but no pull
    /// request was opened.
    #[serde(rename = "complete")]
    Complete {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pr_url: Option<String>,
    },
}

impl ProgressEvent {
    pub fn message(message: impl Into<String>) -> Self {
        Self::AiMessage {
            message: message.into(),
        }
    }

    pub fn read(filepath: impl Into<String>) -> Self {
        Self::ToolRead {
            filepath: filepath.into(),
        }
    }

    /// Edit event with both strings reduced to previews.
    pub fn edit(filepath: impl Into<String>, old_str: &str, new_str: &str) -> Self {
        Self::ToolEdit {
            filepath: filepath.into(),
            old_str: preview(old_str),
            new_str: preview(new_str),
        }
    }

    pub fn bash(command: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ToolBash {
            command: command.into(),
            output: output.into(),
        }
    }

    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            message: "Still working...".to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn complete(message: impl Into<String>, pr_url: Option<String>) -> Self {
        Self::Complete {
            message: message.into(),
            pr_url,
        }
    }

    /// Wire name of this event's `type`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::AiMessage { .. } => "AI Message",
            Self::ToolRead { .. } => "Tool: Read",
            Self::ToolEdit { .. } => "Tool: Edit",
            Self::ToolBash { .. } => "Tool: Bash",
            Self::Heartbeat { .. } => "heartbeat",
            Self::Error { .. } => "error",
            Self::Complete { .. } => "complete",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Complete { .. })
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Self::Heartbeat { .. })
    }
}

/// Collapse all whitespace runs to single spaces and cut to
/// [`PREVIEW_MAX_CHARS`] characters.
pub fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= PREVIEW_MAX_CHARS {
        return collapsed;
    }
    collapsed.chars().take(PREVIEW_MAX_CHARS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_type_names() {
        let cases = [
            (ProgressEvent::message("hi"), "AI Message"),
            (ProgressEvent::read("a.py"), "Tool: Read"),
            (ProgressEvent::edit("a.py", "x", "y"), "Tool: Edit"),
            (ProgressEvent::bash("git add .", ""), "Tool: Bash"),
            (ProgressEvent::heartbeat(), "heartbeat"),
            (ProgressEvent::error("bad"), "error"),
            (ProgressEvent::complete("ok", None), "complete"),
        ];
        for (event, name) in cases {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], name);
            assert_eq!(event.event_type(), name);
        }
    }

    #[test]
    fn test_complete_omits_missing_pr_url() {
        let value = serde_json::to_value(ProgressEvent::complete("done", None)).unwrap();
        assert_eq!(value, json!({"type": "complete", "message": "done"}));

        let value = serde_json::to_value(ProgressEvent::complete(
            "done",
            Some("https://github.com/o/r/pull/1".into()),
        ))
        .unwrap();
        assert_eq!(value["pr_url"], "https://github.com/o/r/pull/1");
    }

    #[test]
    fn test_edit_event_fields() {
        let value = serde_json::to_value(ProgressEvent::edit("a.py", "x\n\ty", "z")).unwrap();
        assert_eq!(
            value,
            json!({"type": "Tool: Edit", "filepath": "a.py", "old_str": "x y", "new_str": "z"})
        );
    }

    #[test]
    fn test_preview_single_line_and_bounded() {
        let long = "word\n".repeat(100);
        let p = preview(&long);
        assert!(!p.contains('\n'));
        assert_eq!(p.chars().count(), PREVIEW_MAX_CHARS);
        assert_eq!(preview("  a \n\n b\t c  "), "a b c");
    }

    #[test]
    fn test_preview_multibyte_safe() {
        let s = "é".repeat(150);
        assert_eq!(preview(&s).chars().count(), PREVIEW_MAX_CHARS);
    }

    #[test]
    fn test_terminal_classification() {
        assert!(ProgressEvent::error("x").is_terminal());
        assert!(ProgressEvent::complete("x", None).is_terminal());
        assert!(!ProgressEvent::heartbeat().is_terminal());
        assert!(ProgressEvent::heartbeat().is_heartbeat());
    }
}
