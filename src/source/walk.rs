use std::path::{Path, PathBuf};

use compact_str::CompactString;
use walkdir::WalkDir;

use super::{LogFile, LogFileIter, SourceEnumerator};
use crate::error::SourceError;
use crate::DEFAULT_LOG_SUFFIX;

/// `SourceEnumerator` over the local filesystem.
///
/// Symlinks are not followed, so only regular files are reported.
#[derive(Debug, Clone)]
pub struct WalkDirEnumerator {
    suffix: CompactString,
}

impl WalkDirEnumerator {
    pub fn new() -> Self {
        Self::with_suffix(DEFAULT_LOG_SUFFIX)
    }

    pub fn with_suffix(suffix: impl Into<CompactString>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }
}

impl Default for WalkDirEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceEnumerator for WalkDirEnumerator {
    fn exists(&self, root: &Path) -> bool {
        root.exists()
    }

    fn canonical_root(&self, root: &Path) -> Option<PathBuf> {
        std::fs::canonicalize(root).ok()
    }

    fn list_log_files(&self, root: &Path) -> LogFileIter {
        let root: PathBuf = root.to_path_buf();
        let suffix = self.suffix.clone();

        let walk = WalkDir::new(&root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();

        Box::new(walk.filter_map(move |entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    return Some(Err(SourceError::Walk {
                        root: root.clone(),
                        source,
                    }))
                }
            };
            if !entry.file_type().is_file() {
                return None;
            }
            let file_name = entry.file_name().to_string_lossy();
            if !file_name.ends_with(suffix.as_str()) {
                return None;
            }
            let file_name = CompactString::from(file_name.as_ref());

            Some(
                entry
                    .metadata()
                    .map(|meta| LogFile {
                        file_name,
                        size_bytes: meta.len(),
                        path: entry.path().to_path_buf(),
                    })
                    .map_err(|source| SourceError::Walk {
                        root: root.clone(),
                        source,
                    }),
            )
        }))
    }
}
