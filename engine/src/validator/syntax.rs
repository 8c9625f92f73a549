//! In-process structural check.
//!
//! Parses source with tree-sitter and reports whether the tree contains error
//! or missing nodes. Nothing is executed. Files in languages without a
//! grammar here are passed through unchecked.

use std::path::Path;

use tree_sitter::{Language, Parser};

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxCheck;

impl SyntaxCheck {
    pub fn new() -> Self {
        Self
    }

    fn language_for(path: &Path) -> Option<Language> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("py") | Some("pyi") => Some(tree_sitter_python::LANGUAGE.into()),
            _ => None,
        }
    }

    /// Whether `source` parses cleanly. `true` when no grammar applies.
    pub fn is_valid(&self, path: &Path, source: &[u8]) -> bool {
        let Some(language) = Self::language_for(path) else {
            return true;
        };

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&language) {
            tracing::warn!(path = %path.display(), error = %e, "Grammar rejected, skipping syntax check");
            return true;
        }

        match parser.parse(source, None) {
            Some(tree) => !tree.root_node().has_error(),
            None => false,
        }
    }
}
