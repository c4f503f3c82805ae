// ============================================================================
// LOG SOURCES
// ============================================================================
// What the collection cycle reads from:
// - Source: a named service root or a raw directory root
// - SourceEnumerator: existence check plus lazy recursive .log enumeration
// - ServiceClassifier: path -> service attribution for raw directories
// ============================================================================

mod classify;
mod walk;

use std::fmt::{self, Display, Formatter};
use std::path::{Path, PathBuf};

use compact_str::CompactString;

use crate::error::SourceResult;

pub use classify::{ServiceClassifier, SubstringClassifier};
pub use walk::WalkDirEnumerator;

/// A configured collection root. Immutable for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Root whose files all belong to one named service.
    Service {
        service: CompactString,
        root: PathBuf,
    },
    /// Root whose files are attributed per path by a classifier.
    Directory { root: PathBuf },
}

impl Source {
    pub fn service(service: impl Into<CompactString>, root: impl Into<PathBuf>) -> Self {
        Source::Service {
            service: service.into(),
            root: root.into(),
        }
    }

    pub fn directory(root: impl Into<PathBuf>) -> Self {
        Source::Directory { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        match self {
            Source::Service { root, .. } | Source::Directory { root } => root,
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Source::Service { .. } => SourceKind::Service,
            Source::Directory { .. } => SourceKind::Directory,
        }
    }
}

impl Display for Source {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Source::Service { service, root } => write!(f, "{service} ({})", root.display()),
            Source::Directory { root } => write!(f, "{}", root.display()),
        }
    }
}

/// Which pass a file was found by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Service,
    Directory,
}

/// A log file found under a source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFile {
    pub file_name: CompactString,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Lazy, finite, single-traversal sequence of log files.
pub type LogFileIter = Box<dyn Iterator<Item = SourceResult<LogFile>> + Send>;

/// Filesystem view consumed by the collection cycle.
#[cfg_attr(test, mockall::automock)]
pub trait SourceEnumerator: Send + Sync {
    /// Whether the root exists. Never fails; a missing root is skipped.
    fn exists(&self, root: &Path) -> bool;

    /// Recursively enumerate the log files under an existing root.
    /// Yields an error when the traversal is interrupted.
    fn list_log_files(&self, root: &Path) -> LogFileIter;

    /// Absolute, symlink-free form of an existing root; `None` when it
    /// cannot be resolved.
    fn canonical_root(&self, root: &Path) -> Option<PathBuf>;
}
