//! Tolerant extraction of a [`ChangePlan`] from free-form model text.
//!
//! Models wrap their JSON in markdown fences, surround it with prose, or
//! (occasionally) return it bare. Strategies are tried in a fixed order and
//! the first candidate that deserializes into a plan wins:
//!
//! 1. fenced code block (```` ```json ```` or a bare fence)
//! 2. balanced-brace scan (string and escape aware)
//! 3. the whole text
//!
//! A candidate only counts if it is an object with an `edits` key, or a bare
//! array of edits. A stray `{}` inside prose is not a plan.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::{ChangePlan, EditOperation};

/// Which extraction strategy produced (or failed to produce) a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionStrategy {
    FencedBlock,
    BalancedBraces,
    WholeText,
}

impl fmt::Display for ExtractionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FencedBlock => write!(f, "fenced_block"),
            Self::BalancedBraces => write!(f, "balanced_braces"),
            Self::WholeText => write!(f, "whole_text"),
        }
    }
}

/// One rejected candidate.
#[derive(Debug, Clone)]
pub struct StrategyAttempt {
    pub strategy: ExtractionStrategy,
    pub reason: String,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum PlanParseError {
    #[error("planner response was empty")]
    EmptyResponse,

    #[error("no change plan found in planner response ({})", summarize(.attempts))]
    Unparsable { attempts: Vec<StrategyAttempt> },
}

fn summarize(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no JSON candidates".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}: {}", a.strategy, a.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A successfully parsed plan plus the strategy that found it.
#[derive(Debug, Clone)]
pub struct ParsedPlan {
    pub plan: ChangePlan,
    pub strategy: ExtractionStrategy,
}

/// Extract a change plan from model output.
pub fn parse_plan(text: &str) -> Result<ParsedPlan, PlanParseError> {
    if text.trim().is_empty() {
        return Err(PlanParseError::EmptyResponse);
    }

    let mut attempts = Vec::new();

    for block in fenced_blocks(text) {
        match decode_candidate(block) {
            Ok(plan) => return Ok(found(plan, ExtractionStrategy::FencedBlock)),
            Err(reason) => attempts.push(StrategyAttempt {
                strategy: ExtractionStrategy::FencedBlock,
                reason,
            }),
        }
    }

    for candidate in balanced_objects(text) {
        match decode_candidate(candidate) {
            Ok(plan) => return Ok(found(plan, ExtractionStrategy::BalancedBraces)),
            Err(reason) => attempts.push(StrategyAttempt {
                strategy: ExtractionStrategy::BalancedBraces,
                reason,
            }),
        }
    }

    match decode_candidate(text) {
        Ok(plan) => Ok(found(plan, ExtractionStrategy::WholeText)),
        Err(reason) => {
            attempts.push(StrategyAttempt {
                strategy: ExtractionStrategy::WholeText,
                reason,
            });
            Err(PlanParseError::Unparsable { attempts })
        }
    }
}

fn found(plan: ChangePlan, strategy: ExtractionStrategy) -> ParsedPlan {
    tracing::debug!(%strategy, edits = plan.len(), "Extracted change plan");
    ParsedPlan { plan, strategy }
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)```").ok())
        .as_ref()
}

/// Contents of every fenced code block, in order of appearance.
fn fenced_blocks(text: &str) -> Vec<&str> {
    let Some(re) = fence_regex() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Top-level balanced `{...}` spans. Braces inside JSON strings are ignored.
fn balanced_objects(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }
        match balanced_end(bytes, i) {
            Some(end) => {
                spans.push(&text[i..end]);
                i = end;
            }
            // Unclosed brace: try the next opening one.
            None => i += 1,
        }
    }
    spans
}

/// Byte offset one past the brace closing the object opened at `start`.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn decode_candidate(candidate: &str) -> Result<ChangePlan, String> {
    let value: Value = serde_json::from_str(candidate.trim()).map_err(|e| e.to_string())?;
    match value {
        Value::Object(ref map) if map.contains_key("edits") => {
            serde_json::from_value::<ChangePlan>(value).map_err(|e| e.to_string())
        }
        Value::Object(_) => Err("object has no `edits` key".to_string()),
        Value::Array(_) => serde_json::from_value::<Vec<EditOperation>>(value)
            .map(ChangePlan::new)
            .map_err(|e| e.to_string()),
        other => Err(format!("expected object or array, got {}", json_kind(&other))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PLAN: &str = r#"{"edits": [{"file": "main.py", "old_str": "", "new_str": "\n# hi\n"}]}"#;

    #[test]
    fn test_fenced_json_block() {
        let text = format!("Here you go:\n```json\n{PLAN}\n```\nDone.");
        let parsed = parse_plan(&text).unwrap();
        assert_eq!(parsed.strategy, ExtractionStrategy::FencedBlock);
        assert_eq!(parsed.plan.len(), 1);
        assert_eq!(parsed.plan.edits[0].new_str, "\n# hi\n");
    }

    #[test]
    fn test_bare_fence() {
        let text = format!("```\n{PLAN}\n```");
        let parsed = parse_plan(&text).unwrap();
        assert_eq!(parsed.strategy, ExtractionStrategy::FencedBlock);
    }

    #[test]
    fn test_balanced_braces_in_prose() {
        let text = format!("I will add a comment. {PLAN} Let me know!");
        let parsed = parse_plan(&text).unwrap();
        assert_eq!(parsed.strategy, ExtractionStrategy::BalancedBraces);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_scan() {
        let text = r#"Sure: {"edits": [{"file": "a.py", "old_str": "d = {", "new_str": "d = {}"}]} ok"#;
        let parsed = parse_plan(text).unwrap();
        assert_eq!(parsed.plan.edits[0].old_str, "d = {");
        assert_eq!(parsed.plan.edits[0].new_str, "d = {}");
    }

    #[test]
    fn test_unclosed_brace_in_prose_before_plan() {
        let text = format!("I'll update the dict literal {{ in config. Plan: {PLAN}");
        let parsed = parse_plan(&text).unwrap();
        assert_eq!(parsed.strategy, ExtractionStrategy::BalancedBraces);
        assert_eq!(parsed.plan.edits[0].file, "main.py");
    }

    #[test]
    fn test_skips_unrelated_object_before_plan() {
        let text = format!(r#"Context {{"note": "x"}} then {PLAN}"#);
        let parsed = parse_plan(&text).unwrap();
        assert_eq!(parsed.strategy, ExtractionStrategy::BalancedBraces);
        assert_eq!(parsed.plan.len(), 1);
    }

    #[test]
    fn test_bare_array_accepted() {
        let text = r#"[{"file": "a.py", "old_str": "x", "new_str": "y"}]"#;
        let parsed = parse_plan(text).unwrap();
        assert_eq!(parsed.strategy, ExtractionStrategy::WholeText);
        assert_eq!(parsed.plan.edits[0].file, "a.py");
    }

    #[test]
    fn test_fence_with_garbage_falls_through_to_braces() {
        let text = format!("```\nnot json\n```\n{PLAN}");
        let parsed = parse_plan(&text).unwrap();
        assert_eq!(parsed.strategy, ExtractionStrategy::BalancedBraces);
    }

    #[test]
    fn test_empty_edits_is_valid_empty_plan() {
        let parsed = parse_plan(r#"{"edits": []}"#).unwrap();
        assert!(parsed.plan.is_empty());
    }

    #[test]
    fn test_prose_only_is_typed_error() {
        let err = parse_plan("I could not figure out what to change.").unwrap_err();
        match err {
            PlanParseError::Unparsable { attempts } => {
                assert_eq!(attempts.last().unwrap().strategy, ExtractionStrategy::WholeText);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_object_without_edits_rejected() {
        let err = parse_plan(r#"{"changes": []}"#).unwrap_err();
        assert!(err.to_string().contains("no `edits` key"));
    }

    #[test]
    fn test_empty_response() {
        assert!(matches!(
            parse_plan("   \n"),
            Err(PlanParseError::EmptyResponse)
        ));
    }
}
