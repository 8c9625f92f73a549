//! Patch applier: literal, first-occurrence edit application.
//!
//! Each [`EditOperation`] is applied against the current on-disk content of
//! its target file:
//!
//! - `old_str == ""` and the file is missing: create it (and parent dirs)
//!   with `new_str`.
//! - `old_str == ""` and the file exists: append `new_str`.
//! - otherwise: replace the first literal occurrence of `old_str` only.
//!   A missing target is an error under [`NotFoundPolicy::Strict`] and a
//!   skipped edit under [`NotFoundPolicy::Lenient`].
//!
//! Matching is byte-wise, so files that are not valid UTF-8 survive untouched
//! outside the replaced span. A successful edit performs exactly one write;
//! an edit that leaves the bytes unchanged performs none.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::plan::EditOperation;
use crate::workspace::{Workspace, WorkspaceError};

/// What to do when `old_str` is not present in the target file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotFoundPolicy {
    /// Fail the edit, leave the file untouched and stop the plan.
    #[default]
    Strict,
    /// Append `"\n" + new_str` instead and keep going. Replace edits on a
    /// missing file are skipped.
    Lenient,
}

#[derive(Debug, thiserror::Error)]
pub enum PatchError {
    #[error("pattern not found in `{file}`")]
    PatternNotFound { file: String },

    #[error("cannot replace text in `{file}`: file does not exist")]
    MissingFile { file: String },

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    #[error("IO error on `{file}`: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    fn io(file: &str, source: std::io::Error) -> Self {
        Self::Io {
            file: file.to_string(),
            source,
        }
    }
}

/// How an edit landed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditAction {
    Created,
    Appended,
    Replaced,
    /// Pattern missing under the lenient policy; appended instead.
    FallbackAppended,
    /// The edit produced identical bytes; nothing was written.
    Unchanged,
    /// Replace target missing under the lenient policy; nothing was written.
    Skipped,
}

impl EditAction {
    /// Whether the edit changed or was meant to change the file.
    pub fn landed(self) -> bool {
        self != Self::Skipped
    }
}

/// Result of one successfully applied edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
    pub file: String,
    pub action: EditAction,
    pub bytes_before: usize,
    pub bytes_after: usize,
}

/// Applies edit operations to a workspace.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatchApplier {
    policy: NotFoundPolicy,
}

impl PatchApplier {
    pub fn new(policy: NotFoundPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> NotFoundPolicy {
        self.policy
    }

    /// Apply one edit.
    pub fn apply(&self, ws: &Workspace, edit: &EditOperation) -> Result<AppliedEdit, PatchError> {
        let path = ws.resolve(&edit.file)?;

        let existing = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(PatchError::io(&edit.file, e)),
        };

        let Some(content) = existing else {
            if !edit.is_append() {
                if self.policy == NotFoundPolicy::Lenient {
                    tracing::warn!(path = %edit.file, "Target file missing, edit skipped");
                    return Ok(AppliedEdit {
                        file: edit.file.clone(),
                        action: EditAction::Skipped,
                        bytes_before: 0,
                        bytes_after: 0,
                    });
                }
                return Err(PatchError::MissingFile {
                    file: edit.file.clone(),
                });
            }
            write_file(&path, edit.new_str.as_bytes(), &edit.file)?;
            tracing::debug!(path = %edit.file, bytes = edit.new_str.len(), "Created file");
            return Ok(AppliedEdit {
                file: edit.file.clone(),
                action: EditAction::Created,
                bytes_before: 0,
                bytes_after: edit.new_str.len(),
            });
        };

        let (updated, action) = if edit.is_append() {
            (concat(&content, b"", edit.new_str.as_bytes()), EditAction::Appended)
        } else {
            match find(&content, edit.old_str.as_bytes()) {
                Some(start) => (
                    splice(&content, start, edit.old_str.len(), edit.new_str.as_bytes()),
                    EditAction::Replaced,
                ),
                None => match self.policy {
                    NotFoundPolicy::Strict => {
                        tracing::warn!(path = %edit.file, "Pattern not found, edit rejected");
                        return Err(PatchError::PatternNotFound {
                            file: edit.file.clone(),
                        });
                    }
                    NotFoundPolicy::Lenient => {
                        tracing::warn!(
                            path = %edit.file,
                            "Pattern not found, appending replacement text instead"
                        );
                        (
                            concat(&content, b"\n", edit.new_str.as_bytes()),
                            EditAction::FallbackAppended,
                        )
                    }
                },
            }
        };

        let bytes_before = content.len();
        let bytes_after = updated.len();
        let action = if updated == content {
            EditAction::Unchanged
        } else {
            write_file(&path, &updated, &edit.file)?;
            action
        };

        tracing::debug!(path = %edit.file, ?action, bytes_before, bytes_after, "Applied edit");
        Ok(AppliedEdit {
            file: edit.file.clone(),
            action,
            bytes_before,
            bytes_after,
        })
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn splice(content: &[u8], start: usize, len: usize, replacement: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() - len + replacement.len());
    out.extend_from_slice(&content[..start]);
    out.extend_from_slice(replacement);
    out.extend_from_slice(&content[start + len..]);
    out
}

fn concat(content: &[u8], separator: &[u8], tail: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + separator.len() + tail.len());
    out.extend_from_slice(content);
    out.extend_from_slice(separator);
    out.extend_from_slice(tail);
    out
}

fn write_file(path: &Path, bytes: &[u8], file: &str) -> Result<(), PatchError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PatchError::io(file, e))?;
    }
    fs::write(path, bytes).map_err(|e| PatchError::io(file, e))
}
