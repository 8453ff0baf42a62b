//! Filesystem helpers for moving organized files

use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Move `source` to `target`, creating parent directories
///
/// Falls back to copy-then-delete when rename fails (e.g. across devices).
/// Never replaces an existing target.
pub async fn move_file(source: &Path, target: &Path) -> io::Result<()> {
    if tokio::fs::try_exists(target).await? {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("Target already exists: {}", target.display()),
        ));
    }

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            tracing::debug!(
                source = %source.display(),
                target = %target.display(),
                error = %rename_err,
                "Rename failed, falling back to copy"
            );
            tokio::fs::copy(source, target).await?;
            if let Err(e) = tokio::fs::remove_file(source).await {
                // Keep a single copy of the content
                let _ = tokio::fs::remove_file(target).await;
                return Err(e);
            }
            Ok(())
        }
    }
}

/// True when both paths name the same file on disk
///
/// Uses device/inode identity on Unix and canonical paths elsewhere, so
/// hard links and differently spelled paths compare equal.
pub fn is_same_file(a: &Path, b: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (std::fs::metadata(a), std::fs::metadata(b)) {
            (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
            _ => false,
        }
    }

    #[cfg(not(unix))]
    {
        match (a.canonicalize(), b.canonicalize()) {
            (Ok(ca), Ok(cb)) => ca == cb,
            _ => false,
        }
    }
}

/// Remove empty directories below `root` (deepest first); `root` itself stays
///
/// Directories that only contain other empty directories go too. Returns
/// the removed directories.
pub fn remove_empty_directories(root: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    let dirs: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .contents_first(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect();

    for dir in dirs {
        let is_empty = std::fs::read_dir(&dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if is_empty && std::fs::remove_dir(&dir).is_ok() {
            removed.push(dir);
        }
    }

    if !removed.is_empty() {
        tracing::debug!(root = %root.display(), count = removed.len(), "Removed empty directories");
    }

    removed
}

/// True when `path` lies strictly inside `parent`
pub fn is_strictly_inside(path: &Path, parent: &Path) -> bool {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let parent = parent.canonicalize().unwrap_or_else(|_| parent.to_path_buf());
    path != parent && path.starts_with(&parent)
}
