//! Directory batch orchestration
//!
//! State progression:
//! SCAN → PRE-SCAN → BATCH (one transaction) → COMMIT → QUARANTINE → PRUNE
//!
//! The pre-scan reads tags and schedules romanization for every file before
//! the first file is processed, so lookups overlap with extraction and the
//! album-year aggregation is complete before any path is generated. All
//! store writes of a batch share one transaction: a failed write rolls the
//! whole batch back, and a failed rollback is fatal.

use crate::db::ports::{PreviewStore, StateStore};
use crate::db::DryRunStore;
use crate::error::{OrganizeError, OrganizeResult};
use crate::models::{AssetOutcome, AssetSkipReason, DirectoryReport, ProcessResult, ProcessingEvent, TrackMetadata};
use crate::services::assets::{artwork_owners, owns_artwork_on_disk};
use crate::services::file_runner::{run_file, FileJob};
use crate::services::file_scanner::FileScanner;
use crate::services::path_generator::PathContext;
use crate::services::processor::MusicProcessor;
use crate::services::quarantine::quarantine_leftovers;
use crate::utils::fs::remove_empty_directories;
use crate::utils::begin_monitored;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

const CALLER: &str = "directory_runner";

/// Short id correlating every log record of one batch
pub fn new_process_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Directory,
    SingleFile,
}

/// Organize every supported file under `directory` in one batch
pub(crate) async fn process_directory(
    processor: &mut MusicProcessor,
    directory: &Path,
) -> OrganizeResult<DirectoryReport> {
    if !directory.is_dir() {
        return Err(OrganizeError::NotADirectory(directory.to_path_buf()));
    }

    let scanner = FileScanner::new(directory, &processor.options.unprocessed_dir_name);
    let files = scanner.audio_files();
    let snapshot = if processor.options.dry_run {
        Vec::new()
    } else {
        scanner.all_files()
    };

    run_batch(processor, directory, files, snapshot, Scope::Directory).await
}

/// Organize a single file in its own batch (no quarantine, no pruning)
pub(crate) async fn process_single_file(
    processor: &mut MusicProcessor,
    file: &Path,
) -> OrganizeResult<DirectoryReport> {
    let directory = file.parent().unwrap_or(Path::new(".")).to_path_buf();
    run_batch(processor, &directory, vec![file.to_path_buf()], Vec::new(), Scope::SingleFile).await
}

async fn run_batch(
    processor: &mut MusicProcessor,
    directory: &Path,
    files: Vec<PathBuf>,
    snapshot: Vec<PathBuf>,
    scope: Scope,
) -> OrganizeResult<DirectoryReport> {
    let start = Instant::now();
    let process_id = new_process_id();
    let dry_run = processor.options.dry_run;

    tracing::info!(
        event = %ProcessingEvent::DirectoryStart,
        process_id = %process_id,
        directory = %directory.display(),
        files = files.len(),
        dry_run,
        "Starting batch"
    );
    if files.is_empty() {
        tracing::info!(
            event = %ProcessingEvent::DirectoryNoFiles,
            process_id = %process_id,
            directory = %directory.display(),
            "No supported audio files found"
        );
    }

    // PRE-SCAN
    let mut context = PathContext::new();
    let mut prefetched = prescan(processor, &files, &mut context).await?;
    let owners = match scope {
        Scope::Directory => artwork_owners(&files),
        Scope::SingleFile => files.iter().filter(|f| owns_artwork_on_disk(f)).cloned().collect(),
    };

    // BATCH
    let pool = processor.db.clone();
    let mut tx = begin_monitored(&pool, CALLER).await?;
    let outcome = match tx.connection() {
        Ok(conn) if dry_run => {
            let mut store = DryRunStore::new(conn);
            run_files(processor, &mut store, &mut context, &files, &mut prefetched, &owners, &process_id).await
        }
        Ok(conn) => {
            run_files(processor, conn, &mut context, &files, &mut prefetched, &owners, &process_id).await
        }
        Err(e) => Err(e.into()),
    };

    let results = match outcome {
        Ok(results) => {
            tx.commit().await?;
            results
        }
        Err(e) => {
            tracing::error!(
                event = %ProcessingEvent::DirectoryError,
                process_id = %process_id,
                directory = %directory.display(),
                error = %e,
                "Batch failed; rolling back"
            );
            if let Err(rollback_error) = tx.rollback().await {
                tracing::error!(
                    event = %ProcessingEvent::DirectoryRollbackError,
                    process_id = %process_id,
                    directory = %directory.display(),
                    error = %rollback_error,
                    cause = %e,
                    "Rollback failed; state store can no longer be trusted"
                );
                return Err(OrganizeError::DirectoryRollback {
                    process_id,
                    directory: directory.to_path_buf(),
                    source: rollback_error,
                });
            }
            return Err(OrganizeError::BatchAborted {
                process_id,
                directory: directory.to_path_buf(),
                message: e.to_string(),
            });
        }
    };

    // QUARANTINE + PRUNE
    let mut quarantined = Vec::new();
    if !dry_run && scope == Scope::Directory {
        let consumed = consumed_paths(&results);
        quarantined = quarantine_leftovers(
            directory,
            &processor.options.unprocessed_dir_name,
            &snapshot,
            &consumed,
            &process_id,
        )
        .await;
        remove_empty_directories(directory);
    }

    let report = summarize(process_id, results, quarantined, start);
    tracing::info!(
        event = %ProcessingEvent::DirectoryComplete,
        process_id = %report.process_id,
        directory = %directory.display(),
        processed = report.processed,
        skipped = report.skipped,
        failed = report.failed,
        quarantined = report.quarantined.len(),
        duration_ms = report.duration.as_millis() as u64,
        "Batch complete"
    );
    Ok(report)
}

/// Read tags, schedule romanization and register album facts for every file
async fn prescan(
    processor: &mut MusicProcessor,
    files: &[PathBuf],
    context: &mut PathContext,
) -> OrganizeResult<HashMap<PathBuf, TrackMetadata>> {
    let dry_run = processor.options.dry_run;
    let base_path = processor.options.base_path.clone();
    let mut extracted = Vec::new();

    {
        let mut conn = processor.db.acquire().await?;
        for path in files {
            if !dry_run {
                match conn.preview_for_source(path, &base_path).await {
                    Ok(Some(entry)) => {
                        context.register(&entry.payload.metadata);
                        continue;
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(source = %path.display(), error = %e, "Preview lookup failed during pre-scan");
                    }
                }
            }

            match processor.extractor.extract(path) {
                Ok(metadata) => {
                    for name in [&metadata.artist, &metadata.album_artist].into_iter().flatten() {
                        processor.romanization.ensure_scheduled(&mut *conn, name).await;
                    }
                    extracted.push((path.clone(), metadata));
                }
                Err(e) => {
                    // Reported when the file itself is processed
                    tracing::debug!(source = %path.display(), error = %e, "Pre-scan extraction failed");
                }
            }
        }
    }

    for (_, metadata) in &extracted {
        let mut romanized = metadata.clone();
        if let Some(artist) = &metadata.artist {
            if let Some(result) = processor.romanization.peek_result(artist).await {
                romanized.artist = Some(result.name);
            }
        }
        if let Some(album_artist) = &metadata.album_artist {
            if let Some(result) = processor.romanization.peek_result(album_artist).await {
                romanized.album_artist = Some(result.name);
            }
        }
        context.register(&romanized);
    }

    Ok(extracted.into_iter().collect())
}

async fn run_files<S>(
    processor: &mut MusicProcessor,
    store: &mut S,
    context: &mut PathContext,
    files: &[PathBuf],
    prefetched: &mut HashMap<PathBuf, TrackMetadata>,
    owners: &HashSet<PathBuf>,
    process_id: &str,
) -> OrganizeResult<Vec<ProcessResult>>
where
    S: StateStore + ?Sized,
{
    let mut results = Vec::with_capacity(files.len());
    for path in files {
        let job = FileJob {
            path,
            owns_artwork: owners.contains(path),
            prefetched: prefetched.remove(path),
        };
        results.push(run_file(processor, store, context, job, process_id).await?);
    }
    Ok(results)
}

/// Source files a batch accounted for (never quarantined)
fn consumed_paths(results: &[ProcessResult]) -> HashSet<PathBuf> {
    let mut consumed = HashSet::new();
    for result in results.iter().filter(|r| r.success) {
        consumed.insert(result.source_path.clone());
        for asset in result.lyrics_result.iter().chain(result.artwork_results.iter()) {
            let kept = matches!(
                asset.outcome,
                AssetOutcome::Moved | AssetOutcome::Skipped(AssetSkipReason::AlreadyAtTarget)
            );
            if kept {
                consumed.insert(asset.source_path.clone());
            }
        }
    }
    consumed
}

fn summarize(
    process_id: String,
    results: Vec<ProcessResult>,
    quarantined: Vec<(PathBuf, PathBuf)>,
    start: Instant,
) -> DirectoryReport {
    let failed = results.iter().filter(|r| !r.success).count();
    let skipped = results.iter().filter(|r| r.success && r.skipped_duplicate).count();
    let processed = results.len() - failed - skipped;

    DirectoryReport {
        process_id,
        results,
        processed,
        skipped,
        failed,
        quarantined,
        duration: start.elapsed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_id_is_short_hex() {
        let id = new_process_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, new_process_id());
    }

    #[test]
    fn test_summary_counts() {
        let ok = ProcessResult {
            success: true,
            ..ProcessResult::new(PathBuf::from("/in/a.mp3"), false)
        };
        let duplicate = ProcessResult {
            success: true,
            skipped_duplicate: true,
            ..ProcessResult::new(PathBuf::from("/in/b.mp3"), false)
        };
        let failed = ProcessResult::new(PathBuf::from("/in/c.mp3"), false).failed("boom");

        let report = summarize("id".to_string(), vec![ok, duplicate, failed], Vec::new(), Instant::now());

        assert_eq!((report.processed, report.skipped, report.failed), (1, 1, 1));
        assert_eq!(report.failures().count(), 1);
    }
}
