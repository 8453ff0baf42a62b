//! Source tree discovery
//!
//! Sorted, non-following walk of a source directory. The quarantine folder
//! at the top of the source and platform junk files are never returned.

use crate::services::metadata_extractor::is_supported_audio;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

const IGNORED_FILE_NAMES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// File discovery for one source directory
pub struct FileScanner {
    root: PathBuf,
    unprocessed_dir: PathBuf,
}

impl FileScanner {
    pub fn new(root: &Path, unprocessed_dir_name: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            unprocessed_dir: root.join(unprocessed_dir_name),
        }
    }

    fn should_visit(&self, entry: &DirEntry) -> bool {
        if entry.file_type().is_dir() {
            return entry.path() != self.unprocessed_dir;
        }
        let name = entry.file_name().to_string_lossy();
        !IGNORED_FILE_NAMES.contains(&name.as_ref())
    }

    /// Every regular file under the root, in sorted traversal order
    pub fn all_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| self.should_visit(e));

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() => files.push(entry.into_path()),
                Ok(_) => {}
                Err(e) => {
                    // Continue scanning, don't abort
                    tracing::warn!(root = %self.root.display(), error = %e, "Error accessing entry");
                }
            }
        }

        files
    }

    /// Supported audio files under the root, in sorted traversal order
    pub fn audio_files(&self) -> Vec<PathBuf> {
        let files: Vec<PathBuf> = self
            .all_files()
            .into_iter()
            .filter(|path| is_supported_audio(path))
            .collect();

        tracing::debug!(root = %self.root.display(), count = files.len(), "Discovered audio files");
        files
    }
}
