//! Quarantine of files an organize run left behind
//!
//! Files present in the source before the batch that the batch neither
//! organized nor moved as lyrics/artwork go to
//! `<source>/<unprocessed>/<relative path>`. Nothing is overwritten: a taken
//! destination gets `_<n>` appended to its stem.

use crate::models::ProcessingEvent;
use crate::utils::fs::move_file;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Free destination for `file` under `unprocessed_dir`
pub fn quarantine_destination(root: &Path, unprocessed_dir: &Path, file: &Path) -> PathBuf {
    let relative = file.strip_prefix(root).unwrap_or(file);
    let relative = if relative.is_absolute() {
        // Outside the root: keep only the file name
        PathBuf::from(relative.file_name().unwrap_or_default())
    } else {
        relative.to_path_buf()
    };

    let candidate = unprocessed_dir.join(&relative);
    if !candidate.exists() {
        return candidate;
    }

    let stem = candidate
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = candidate
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();

    let mut n = 1u32;
    loop {
        let numbered = candidate.with_file_name(format!("{}_{}{}", stem, n, extension));
        if !numbered.exists() {
            return numbered;
        }
        n += 1;
    }
}

/// Move leftover `snapshot` files into the quarantine folder
///
/// Returns `(source, destination)` for every file moved. Failures are
/// logged and the file stays where it is.
pub async fn quarantine_leftovers(
    root: &Path,
    unprocessed_dir_name: &str,
    snapshot: &[PathBuf],
    consumed: &HashSet<PathBuf>,
    process_id: &str,
) -> Vec<(PathBuf, PathBuf)> {
    let unprocessed_dir = root.join(unprocessed_dir_name);
    let mut moved = Vec::new();

    for file in snapshot {
        if consumed.contains(file) || file.starts_with(&unprocessed_dir) || !file.is_file() {
            continue;
        }

        let destination = quarantine_destination(root, &unprocessed_dir, file);
        match move_file(file, &destination).await {
            Ok(()) => {
                tracing::info!(
                    event = %ProcessingEvent::UnprocessedMove,
                    process_id,
                    source = %file.display(),
                    target = %destination.display(),
                    "Moved unprocessed file"
                );
                moved.push((file.clone(), destination));
            }
            Err(e) => {
                tracing::warn!(
                    event = %ProcessingEvent::UnprocessedMove,
                    process_id,
                    source = %file.display(),
                    error = %e,
                    "Failed to move unprocessed file"
                );
            }
        }
    }

    moved
}
