//! Request-scoped workspace.
//!
//! A [`Workspace`] owns a temporary directory for the lifetime of one request.
//! Dropping it deletes the tree, so every exit path (success, failure, panic,
//! cancelled task) releases it. All file access from the applier and the
//! validator goes through [`Workspace::resolve`], which keeps paths inside the
//! root and away from the version-control metadata subtree.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use ignore::WalkBuilder;
use tempfile::TempDir;

/// Name of the reserved metadata directory.
pub const METADATA_DIR: &str = ".git";

#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    #[error("failed to create workspace: {0}")]
    Create(#[source] std::io::Error),

    #[error("path `{0}` is empty or not a file path")]
    InvalidPath(String),

    #[error("path `{0}` escapes the workspace")]
    PathEscapes(String),

    #[error("path `{0}` is inside the version-control metadata directory")]
    Reserved(String),

    #[error("IO error on `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Which files count as candidate source files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFilter {
    /// File extensions without the leading dot.
    pub extensions: Vec<String>,
    /// Directory names skipped anywhere in the tree.
    pub excluded_dirs: Vec<String>,
}

impl Default for SourceFilter {
    fn default() -> Self {
        Self {
            extensions: vec!["py".to_string()],
            excluded_dirs: [
                "__pycache__",
                "node_modules",
                "target",
                "build",
                "dist",
                "venv",
                ".venv",
                ".tox",
                ".mypy_cache",
                ".pytest_cache",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl SourceFilter {
    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|want| want == ext))
    }

    fn is_excluded_dir(&self, name: &str) -> bool {
        name == METADATA_DIR || self.excluded_dirs.iter().any(|d| d == name)
    }
}

/// Transient file tree for one request.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
    root: PathBuf,
}

impl Workspace {
    /// Create an empty workspace under the system temp directory.
    pub fn create() -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix("backspace-")
            .tempdir()
            .map_err(WorkspaceError::Create)?;
        Self::from_temp_dir(dir)
    }

    /// Create an empty workspace under `parent`.
    pub fn create_in(parent: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let dir = tempfile::Builder::new()
            .prefix("backspace-")
            .tempdir_in(parent)
            .map_err(WorkspaceError::Create)?;
        Self::from_temp_dir(dir)
    }

    fn from_temp_dir(dir: TempDir) -> Result<Self, WorkspaceError> {
        let root = dir.path().canonicalize().map_err(WorkspaceError::Create)?;
        tracing::debug!(root = %root.display(), "Workspace created");
        Ok(Self { dir, root })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a workspace-relative path to an absolute one.
    ///
    /// Rejects absolute paths, `..` components, anything under `.git`, and
    /// paths whose existing ancestors resolve (through symlinks) outside the
    /// root. The target itself need not exist.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, WorkspaceError> {
        let mut clean = PathBuf::new();
        for component in Path::new(relative).components() {
            match component {
                Component::Normal(part) => {
                    if part == METADATA_DIR {
                        return Err(WorkspaceError::Reserved(relative.to_string()));
                    }
                    clean.push(part);
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(WorkspaceError::PathEscapes(relative.to_string()));
                }
            }
        }
        if clean.as_os_str().is_empty() {
            return Err(WorkspaceError::InvalidPath(relative.to_string()));
        }

        let candidate = self.root.join(&clean);

        let mut probe = Some(candidate.as_path());
        while let Some(path) = probe {
            if path.exists() {
                let canon = path
                    .canonicalize()
                    .map_err(|e| WorkspaceError::io(relative, e))?;
                if !canon.starts_with(&self.root) {
                    return Err(WorkspaceError::PathEscapes(relative.to_string()));
                }
                break;
            }
            probe = path.parent();
        }

        Ok(candidate)
    }

    /// Candidate source files as sorted, `/`-separated relative paths.
    ///
    /// Only [`METADATA_DIR`] and the filter's excluded directories are
    /// skipped. Dot-directories and ignore files do not hide anything, since
    /// edits can land there and get committed.
    pub fn source_files(&self, filter: &SourceFilter) -> Vec<String> {
        let excluded = filter.clone();
        let walker = WalkBuilder::new(&self.root)
            .standard_filters(false)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !(is_dir
                    && entry.depth() > 0
                    && excluded.is_excluded_dir(&entry.file_name().to_string_lossy()))
            })
            .build();

        let mut files: Vec<String> = walker
            .flatten()
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .filter(|entry| filter.matches_extension(entry.path()))
            .filter_map(|entry| self.relative(entry.path()))
            .collect();

        files.sort();
        files
    }

    /// Read the given relative paths into a sorted map.
    ///
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn read_files(&self, files: &[String]) -> Result<BTreeMap<String, String>, WorkspaceError> {
        let mut contents = BTreeMap::new();
        for file in files {
            let path = self.resolve(file)?;
            let bytes = fs::read(&path).map_err(|e| WorkspaceError::io(file.as_str(), e))?;
            contents.insert(file.clone(), String::from_utf8_lossy(&bytes).into_owned());
        }
        Ok(contents)
    }

    fn relative(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }

    /// Delete the workspace now, surfacing any removal error.
    pub fn close(self) -> Result<(), WorkspaceError> {
        let root = self.root.display().to_string();
        self.dir
            .close()
            .map_err(|e| WorkspaceError::io(root, e))
    }
}
