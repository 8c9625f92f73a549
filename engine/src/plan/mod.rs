//! Change plans: the ordered edit operations a planner hands to the applier.
//!
//! An [`EditOperation`] is one literal find-and-replace (or append/create)
//! against one file. A [`ChangePlan`] is applied strictly in order: later
//! operations see the file state left behind by earlier ones.

pub mod fallback;
pub mod parser;

use serde::{Deserialize, Serialize};

pub use fallback::placeholder_plan;
pub use parser::{parse_plan, ExtractionStrategy, PlanParseError};

/// A single literal edit against one file.
///
/// `old_str == ""` means append (or create when the file is missing).
/// A non-empty `old_str` is matched literally, never as a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditOperation {
    /// Path relative to the workspace root.
    pub file: String,
    #[serde(default)]
    pub old_str: String,
    #[serde(default)]
    pub new_str: String,
}

impl EditOperation {
    pub fn new(
        file: impl Into<String>,
        old_str: impl Into<String>,
        new_str: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            old_str: old_str.into(),
            new_str: new_str.into(),
        }
    }

    /// Append `new_str` to `file`, creating it if needed.
    pub fn append(file: impl Into<String>, new_str: impl Into<String>) -> Self {
        Self::new(file, "", new_str)
    }

    /// Whether this operation appends instead of replacing.
    pub fn is_append(&self) -> bool {
        self.old_str.is_empty()
    }
}

/// Ordered sequence of edit operations.
///
/// Serialized as `{"edits": [...]}`, the shape planners are asked to return.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangePlan {
    #[serde(default)]
    pub edits: Vec<EditOperation>,
}

impl ChangePlan {
    pub fn new(edits: Vec<EditOperation>) -> Self {
        Self { edits }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, EditOperation> {
        self.edits.iter()
    }
}

impl FromIterator<EditOperation> for ChangePlan {
    fn from_iter<T: IntoIterator<Item = EditOperation>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ChangePlan {
    type Item = &'a EditOperation;
    type IntoIter = std::slice::Iter<'a, EditOperation>;

    fn into_iter(self) -> Self::IntoIter {
        self.edits.iter()
    }
}
