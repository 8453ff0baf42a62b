//! Lyrics and artwork that travel with a track
//!
//! A lyrics file is a sibling with the track's stem and an `.lrc`
//! extension. Artwork (`.jpg`, `.jpeg`, `.png` siblings) belongs to the
//! lexicographically first supported track of its directory, so it is moved
//! once per album folder. Every outcome other than a completed move becomes
//! a warning on the track's result.

use crate::models::{AssetKind, AssetOutcome, AssetResult, AssetSkipReason, ProcessingEvent};
use crate::services::metadata_extractor::is_supported_audio;
use crate::utils::fs::{is_same_file, move_file};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

const LYRICS_EXTENSION: &str = "lrc";
const ARTWORK_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

fn has_extension(path: &Path, wanted: &[&str]) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            wanted.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn sorted_siblings(path: &Path) -> Vec<PathBuf> {
    let Some(dir) = path.parent() else {
        return Vec::new();
    };
    let mut siblings: Vec<PathBuf> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect(),
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Cannot list directory for assets");
            Vec::new()
        }
    };
    siblings.sort();
    siblings
}

/// Lyrics candidates for `track` (same stem, `.lrc` in any case), sorted
pub fn find_lyrics(track: &Path) -> Vec<PathBuf> {
    let Some(stem) = track.file_stem() else {
        return Vec::new();
    };
    sorted_siblings(track)
        .into_iter()
        .filter(|p| p.file_stem() == Some(stem) && has_extension(p, &[LYRICS_EXTENSION]))
        .collect()
}

/// Artwork files next to `track`, sorted
pub fn find_artwork(track: &Path) -> Vec<PathBuf> {
    sorted_siblings(track)
        .into_iter()
        .filter(|p| has_extension(p, ARTWORK_EXTENSIONS))
        .collect()
}

/// The lexicographically first supported track of each directory
pub fn artwork_owners(tracks: &[PathBuf]) -> HashSet<PathBuf> {
    let mut first: BTreeMap<&Path, &PathBuf> = BTreeMap::new();
    for track in tracks.iter().filter(|t| is_supported_audio(t)) {
        let Some(dir) = track.parent() else {
            continue;
        };
        first
            .entry(dir)
            .and_modify(|current| {
                if track < *current {
                    *current = track;
                }
            })
            .or_insert(track);
    }
    first.into_values().cloned().collect()
}

/// True when `track` is the first supported track in its directory on disk
pub fn owns_artwork_on_disk(track: &Path) -> bool {
    sorted_siblings(track)
        .into_iter()
        .find(|p| is_supported_audio(p))
        .is_some_and(|first| first == track)
}

fn events(kind: AssetKind) -> [ProcessingEvent; 4] {
    match kind {
        AssetKind::Lyrics => [
            ProcessingEvent::LyricsMove,
            ProcessingEvent::LyricsPlan,
            ProcessingEvent::LyricsSkip,
            ProcessingEvent::LyricsError,
        ],
        AssetKind::Artwork => [
            ProcessingEvent::ArtworkMove,
            ProcessingEvent::ArtworkPlan,
            ProcessingEvent::ArtworkSkip,
            ProcessingEvent::ArtworkError,
        ],
    }
}

/// Move (or plan) one associated file
pub async fn relocate(
    kind: AssetKind,
    source: &Path,
    target: Option<&Path>,
    dry_run: bool,
    process_id: &str,
) -> AssetResult {
    let outcome = decide(source, target, dry_run).await;
    let [moved, planned, skipped, failed] = events(kind);
    let target_display = target.map(|t| t.display().to_string()).unwrap_or_default();

    match &outcome {
        AssetOutcome::Moved => tracing::info!(
            event = %moved, process_id, source = %source.display(), target = %target_display, "Moved associated file"
        ),
        AssetOutcome::Planned => tracing::info!(
            event = %planned, process_id, source = %source.display(), target = %target_display, "Would move associated file"
        ),
        AssetOutcome::Skipped(reason) => tracing::info!(
            event = %skipped, process_id, source = %source.display(), target = %target_display,
            reason = reason.as_str(), "Skipped associated file"
        ),
        AssetOutcome::Failed(message) => tracing::warn!(
            event = %failed, process_id, source = %source.display(), target = %target_display,
            error = %message, "Failed to move associated file"
        ),
    }

    AssetResult {
        kind,
        source_path: source.to_path_buf(),
        target_path: target.map(Path::to_path_buf),
        outcome,
    }
}

async fn decide(source: &Path, target: Option<&Path>, dry_run: bool) -> AssetOutcome {
    let Some(target) = target else {
        return AssetOutcome::Skipped(AssetSkipReason::NoTargetTrack);
    };
    if !source.exists() {
        return AssetOutcome::Skipped(AssetSkipReason::SourceMissing);
    }
    if source == target || is_same_file(source, target) {
        return AssetOutcome::Skipped(AssetSkipReason::AlreadyAtTarget);
    }
    if target.exists() {
        return AssetOutcome::Skipped(AssetSkipReason::TargetExists);
    }
    if dry_run {
        return AssetOutcome::Planned;
    }

    match move_file(source, target).await {
        Ok(()) => AssetOutcome::Moved,
        Err(e) => AssetOutcome::Failed(e.to_string()),
    }
}

/// Assets of one track after its target is known
#[derive(Debug, Default)]
pub struct AssetFollowUp {
    pub lyrics: Option<AssetResult>,
    pub artwork: Vec<AssetResult>,
    pub warnings: Vec<String>,
}

/// Relocate the lyrics and (for the artwork owner) artwork of `track`
pub async fn follow_track(
    track: &Path,
    track_target: Option<&Path>,
    owns_artwork: bool,
    dry_run: bool,
    process_id: &str,
) -> AssetFollowUp {
    let mut follow_up = AssetFollowUp::default();

    let lyrics = find_lyrics(track);
    if lyrics.len() > 1 {
        follow_up.warnings.push(format!(
            "Multiple lyrics files for {}; using {}",
            track.display(),
            lyrics[0].display()
        ));
    }
    if let Some(source) = lyrics.first() {
        let target = track_target.map(|t| t.with_extension(LYRICS_EXTENSION));
        let result = relocate(AssetKind::Lyrics, source, target.as_deref(), dry_run, process_id).await;
        follow_up.warnings.extend(result.warning());
        follow_up.lyrics = Some(result);
    }

    if owns_artwork {
        for source in find_artwork(track) {
            let target = match (track_target.and_then(Path::parent), source.file_name()) {
                (Some(dir), Some(name)) => Some(dir.join(name)),
                _ => None,
            };
            let result =
                relocate(AssetKind::Artwork, &source, target.as_deref(), dry_run, process_id).await;
            follow_up.warnings.extend(result.warning());
            follow_up.artwork.push(result);
        }
    }

    follow_up
}
