//! Per-file organize steps
//!
//! State progression:
//! HASH → PREVIEW LOOKUP → EXTRACT/REUSE → ROMANIZE → TARGET → DUPLICATE CHECK
//! → MOVE (or STAGE PREVIEW) → ASSETS
//!
//! Everything that goes wrong with the file itself ends in a failed
//! [`ProcessResult`]. A failing state-store call is returned as an error
//! instead so the directory runner can roll the batch back.

use crate::db::ports::StateStore;
use crate::error::OrganizeResult;
use crate::models::{PreviewEntry, PreviewPayload, ProcessResult, ProcessingEvent, RomanizationSource, TrackMetadata};
use crate::services::artist_id::{cached_artist_id, is_valid};
use crate::services::assets::follow_track;
use crate::services::file_hasher::calculate_hash;
use crate::services::path_generator::PathContext;
use crate::services::processor::MusicProcessor;
use crate::services::romanization::RomanizationCoordinator;
use crate::utils::fs::{is_same_file, move_file};
use std::path::Path;

/// One file handed to the runner by the directory runner
pub(crate) struct FileJob<'a> {
    pub path: &'a Path,
    /// First supported track of its directory (moves the artwork)
    pub owns_artwork: bool,
    /// Tags read during the pre-scan
    pub prefetched: Option<TrackMetadata>,
}

enum Failure {
    File(String),
    Store(omym_common::Error),
}

fn file_failure(e: impl std::fmt::Display) -> Failure {
    Failure::File(e.to_string())
}

/// Process one file inside the current batch
pub(crate) async fn run_file<S>(
    processor: &mut MusicProcessor,
    store: &mut S,
    context: &mut PathContext,
    job: FileJob<'_>,
    process_id: &str,
) -> OrganizeResult<ProcessResult>
where
    S: StateStore + ?Sized,
{
    let path = job.path;
    let mut result = ProcessResult::new(path.to_path_buf(), processor.options.dry_run);

    tracing::debug!(
        event = %ProcessingEvent::FileStart,
        process_id,
        source = %path.display(),
        "Processing file"
    );

    match organize(processor, store, context, job, process_id, &mut result).await {
        Ok(()) => Ok(result),
        Err(Failure::File(message)) => {
            tracing::error!(
                event = %ProcessingEvent::FileError,
                process_id,
                source = %path.display(),
                file_hash = ?result.file_hash,
                error = %message,
                "Failed to process file"
            );
            Ok(result.failed(message))
        }
        Err(Failure::Store(e)) => {
            tracing::error!(
                event = %ProcessingEvent::FileError,
                process_id,
                source = %path.display(),
                file_hash = ?result.file_hash,
                error = %e,
                "State store write failed; aborting batch"
            );
            Err(e.into())
        }
    }
}

async fn organize<S>(
    processor: &mut MusicProcessor,
    store: &mut S,
    context: &mut PathContext,
    job: FileJob<'_>,
    process_id: &str,
    result: &mut ProcessResult,
) -> Result<(), Failure>
where
    S: StateStore + ?Sized,
{
    let path = job.path;
    let dry_run = processor.options.dry_run;
    let base_path = processor.options.base_path.clone();

    // HASH
    let file_hash = calculate_hash(path).await.map_err(file_failure)?;
    result.file_hash = Some(file_hash.clone());

    // PREVIEW LOOKUP: a real run consumes what the preceding plan decided
    let preview = if dry_run {
        None
    } else {
        let entry = store.preview(&file_hash).await.map_err(Failure::Store)?;
        if entry.is_some() {
            store.delete_preview(&file_hash).await.map_err(Failure::Store)?;
        }
        entry.filter(|e| e.source_path == path && e.base_path == base_path)
    };

    // EXTRACT/REUSE + ROMANIZE
    let mut payload = match preview {
        Some(entry) => {
            tracing::debug!(process_id, source = %path.display(), "Reusing planned metadata");
            persist_planned_romanization(store, &entry.payload).await;
            entry.payload
        }
        None => {
            let metadata = match job.prefetched {
                Some(metadata) => metadata,
                None => processor.extractor.extract(path).map_err(file_failure)?,
            };
            romanize_metadata(&mut processor.romanization, store, metadata).await
        }
    };

    let artist_id = match payload.artist_id.clone().filter(|id| is_valid(id)) {
        Some(id) => id,
        None => {
            let name = payload.metadata.artist.clone().unwrap_or_default();
            cached_artist_id(store, &name).await
        }
    };
    payload.artist_id = Some(artist_id.clone());
    result.metadata = Some(payload.metadata.clone());
    result.artist_id = Some(artist_id.clone());

    // TARGET
    let candidate = base_path.join(context.relative_path(&payload.metadata, &artist_id));
    let recorded = store.recorded_target(&file_hash).await.map_err(Failure::Store)?;

    // DUPLICATE CHECK
    if is_same_file(path, &candidate) {
        context.reserve(&candidate);
        if !dry_run && recorded.as_deref() != Some(candidate.as_path()) {
            let original = store
                .record_before(&file_hash, path, &payload.metadata)
                .await
                .map_err(Failure::Store)?;
            store
                .record_after(&file_hash, &original, &candidate)
                .await
                .map_err(Failure::Store)?;
        }
        tracing::info!(
            event = %ProcessingEvent::FileAlreadyOrganized,
            process_id,
            source = %path.display(),
            "File already organized"
        );
        result.already_organized = true;
        result.target_path = Some(candidate);
    } else if recorded.as_deref() == Some(candidate.as_path()) && candidate.exists() {
        tracing::info!(
            event = %ProcessingEvent::FileSkipDuplicate,
            process_id,
            source = %path.display(),
            target = %candidate.display(),
            "Content already organized at target; skipping"
        );
        result.skipped_duplicate = true;
        result.target_path = Some(candidate);
    } else {
        if let Some(previous) = recorded.as_deref() {
            tracing::debug!(
                process_id,
                previous = %previous.display(),
                target = %candidate.display(),
                "Recorded target changed; relocating"
            );
        }

        let target = context.find_available_target(&candidate, Some(path));
        context.reserve(&target);

        if dry_run {
            let entry = PreviewEntry {
                file_hash: file_hash.clone(),
                source_path: path.to_path_buf(),
                base_path: base_path.clone(),
                target_path: Some(target.clone()),
                payload,
            };
            store.upsert_preview(&entry).await.map_err(Failure::Store)?;
            tracing::info!(
                event = %ProcessingEvent::FilePlan,
                process_id,
                source = %path.display(),
                target = %target.display(),
                "Would move file"
            );
        } else {
            move_file(path, &target).await.map_err(|e| {
                Failure::File(format!("Failed to move to {}: {}", target.display(), e))
            })?;
            let original = store
                .record_before(&file_hash, path, &payload.metadata)
                .await
                .map_err(Failure::Store)?;
            store
                .record_after(&file_hash, &original, &target)
                .await
                .map_err(Failure::Store)?;
            tracing::info!(
                event = %ProcessingEvent::FileMove,
                process_id,
                source = %path.display(),
                target = %target.display(),
                "Moved file"
            );
        }
        result.target_path = Some(target);
    }
    result.success = true;

    // ASSETS
    let follow_up = follow_track(
        path,
        result.target_path.as_deref(),
        job.owns_artwork,
        dry_run,
        process_id,
    )
    .await;
    result.lyrics_result = follow_up.lyrics;
    result.artwork_results = follow_up.artwork;
    result.warnings.extend(follow_up.warnings);

    Ok(())
}

/// Replace artist and album artist with their romanized forms
pub(crate) async fn romanize_metadata<S>(
    coordinator: &mut RomanizationCoordinator,
    store: &mut S,
    mut metadata: TrackMetadata,
) -> PreviewPayload
where
    S: StateStore + ?Sized,
{
    let original_artist = metadata.artist.clone();
    let original_album_artist = metadata.album_artist.clone();
    let mut artist_source = None;
    let mut album_artist_source = None;

    if let Some(artist) = &original_artist {
        let romanized = coordinator.await_result(store, artist).await;
        artist_source = romanized.source;
        metadata.artist = Some(romanized.name);
    }
    if let Some(album_artist) = &original_album_artist {
        let romanized = coordinator.await_result(store, album_artist).await;
        album_artist_source = romanized.source;
        metadata.album_artist = Some(romanized.name);
    }

    PreviewPayload {
        metadata,
        original_artist,
        original_album_artist,
        artist_id: None,
        artist_romanization_source: artist_source,
        album_artist_romanization_source: album_artist_source,
    }
}

/// Cache the romanizations a plan decided, now that the run is real
async fn persist_planned_romanization<S>(store: &mut S, payload: &PreviewPayload)
where
    S: StateStore + ?Sized,
{
    let pairs = [
        (
            &payload.original_artist,
            &payload.metadata.artist,
            payload.artist_romanization_source,
        ),
        (
            &payload.original_album_artist,
            &payload.metadata.album_artist,
            payload.album_artist_romanization_source,
        ),
    ];

    for (original, romanized, source) in pairs {
        let (Some(original), Some(romanized), Some(source)) = (original, romanized, source) else {
            continue;
        };
        let original = original.trim();
        if source == RomanizationSource::Cache || original == romanized {
            continue;
        }
        if let Err(e) = store.upsert_romanized_name(original, romanized, source).await {
            tracing::warn!(artist = original, error = %e, "Failed to cache planned romanization");
        }
    }
}
