//! Data types shared across the organize pipeline

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Tag metadata for one audio file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub genre: Option<String>,
    pub year: Option<u32>,
    pub track_number: Option<u32>,
    pub track_total: Option<u32>,
    pub disc_number: Option<u32>,
    pub disc_total: Option<u32>,
    /// Lower-case extension including the dot (".flac")
    pub file_extension: String,
}

/// Where a romanized artist name came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RomanizationSource {
    UserPreference,
    Cache,
    #[serde(rename = "musicbrainz")]
    ExternalLookup,
    #[serde(rename = "transliteration")]
    FallbackTransliteration,
}

impl RomanizationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RomanizationSource::UserPreference => "user_preference",
            RomanizationSource::Cache => "cache",
            RomanizationSource::ExternalLookup => "musicbrainz",
            RomanizationSource::FallbackTransliteration => "transliteration",
        }
    }
}

impl fmt::Display for RomanizationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RomanizationSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_preference" => Ok(RomanizationSource::UserPreference),
            "cache" => Ok(RomanizationSource::Cache),
            "musicbrainz" => Ok(RomanizationSource::ExternalLookup),
            "transliteration" => Ok(RomanizationSource::FallbackTransliteration),
            other => Err(format!("unknown romanization source: {}", other)),
        }
    }
}

/// Dry-run decision stored for the following real run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewPayload {
    /// Metadata after romanization
    pub metadata: TrackMetadata,
    /// Artist tag as read from the file
    pub original_artist: Option<String>,
    /// Album-artist tag as read from the file
    pub original_album_artist: Option<String>,
    pub artist_id: Option<String>,
    #[serde(default)]
    pub artist_romanization_source: Option<RomanizationSource>,
    #[serde(default)]
    pub album_artist_romanization_source: Option<RomanizationSource>,
}

/// Row of the preview cache
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewEntry {
    pub file_hash: String,
    pub source_path: PathBuf,
    pub base_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub payload: PreviewPayload,
}

/// Associated file moved alongside a track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Lyrics,
    Artwork,
}

/// Why an associated file stayed where it was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSkipReason {
    AlreadyAtTarget,
    TargetExists,
    SourceMissing,
    NoTargetTrack,
}

impl AssetSkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetSkipReason::AlreadyAtTarget => "already_at_target",
            AssetSkipReason::TargetExists => "target_exists",
            AssetSkipReason::SourceMissing => "source_missing",
            AssetSkipReason::NoTargetTrack => "no_target_track",
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            AssetSkipReason::AlreadyAtTarget => "already organized",
            AssetSkipReason::TargetExists => "target already exists",
            AssetSkipReason::SourceMissing => "source file missing",
            AssetSkipReason::NoTargetTrack => "no organized track to follow",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetOutcome {
    Moved,
    /// Dry run: would have moved
    Planned,
    Skipped(AssetSkipReason),
    Failed(String),
}

/// Result of relocating one lyrics or artwork file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetResult {
    pub kind: AssetKind,
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub outcome: AssetOutcome,
}

impl AssetResult {
    pub fn moved(&self) -> bool {
        self.outcome == AssetOutcome::Moved
    }

    /// User-facing warning for anything but a completed move
    pub fn warning(&self) -> Option<String> {
        let label = match self.kind {
            AssetKind::Lyrics => "Lyrics",
            AssetKind::Artwork => "Artwork",
        };
        let source = self.source_path.display();

        match &self.outcome {
            AssetOutcome::Moved => None,
            AssetOutcome::Planned => Some(format!(
                "Dry run: {} {} would move to {}",
                label.to_lowercase(),
                source,
                self.target_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            )),
            AssetOutcome::Skipped(reason) => Some(format!(
                "{} file {} not moved: {}",
                label,
                source,
                reason.describe()
            )),
            AssetOutcome::Failed(message) => {
                Some(format!("{} file {} failed to move: {}", label, source, message))
            }
        }
    }
}

/// Outcome of processing one audio file
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessResult {
    pub source_path: PathBuf,
    pub target_path: Option<PathBuf>,
    pub success: bool,
    pub error_message: Option<String>,
    pub dry_run: bool,
    pub file_hash: Option<String>,
    pub metadata: Option<TrackMetadata>,
    pub artist_id: Option<String>,
    pub lyrics_result: Option<AssetResult>,
    pub artwork_results: Vec<AssetResult>,
    pub warnings: Vec<String>,
    /// Content already recorded at this target from another location
    pub skipped_duplicate: bool,
    /// Source is the organized file itself
    pub already_organized: bool,
}

impl ProcessResult {
    pub fn new(source_path: PathBuf, dry_run: bool) -> Self {
        Self {
            source_path,
            target_path: None,
            success: false,
            error_message: None,
            dry_run,
            file_hash: None,
            metadata: None,
            artist_id: None,
            lyrics_result: None,
            artwork_results: Vec::new(),
            warnings: Vec::new(),
            skipped_duplicate: false,
            already_organized: false,
        }
    }

    pub fn failed(mut self, message: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(message.into());
        self
    }
}

/// Aggregate of one directory batch
#[derive(Debug, Clone, Default)]
pub struct DirectoryReport {
    pub process_id: String,
    pub results: Vec<ProcessResult>,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Files relocated to the quarantine folder (source, destination)
    pub quarantined: Vec<(PathBuf, PathBuf)>,
    pub duration: Duration,
}

impl DirectoryReport {
    pub fn failures(&self) -> impl Iterator<Item = &ProcessResult> {
        self.results.iter().filter(|r| !r.success)
    }
}

/// Structured log event names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingEvent {
    DirectoryStart,
    DirectoryComplete,
    DirectoryNoFiles,
    DirectoryError,
    DirectoryRollbackError,
    FileStart,
    FileMove,
    FilePlan,
    FileSkipDuplicate,
    FileAlreadyOrganized,
    FileError,
    LyricsMove,
    LyricsPlan,
    LyricsSkip,
    LyricsError,
    ArtworkMove,
    ArtworkPlan,
    ArtworkSkip,
    ArtworkError,
    UnprocessedMove,
    RestoreMove,
    RestorePlan,
    RestoreSkip,
    RestoreError,
}

impl ProcessingEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingEvent::DirectoryStart => "directory_start",
            ProcessingEvent::DirectoryComplete => "directory_complete",
            ProcessingEvent::DirectoryNoFiles => "directory_no_files",
            ProcessingEvent::DirectoryError => "directory_error",
            ProcessingEvent::DirectoryRollbackError => "directory_rollback_error",
            ProcessingEvent::FileStart => "file_start",
            ProcessingEvent::FileMove => "file_move",
            ProcessingEvent::FilePlan => "file_plan",
            ProcessingEvent::FileSkipDuplicate => "file_skip_duplicate",
            ProcessingEvent::FileAlreadyOrganized => "file_already_organized",
            ProcessingEvent::FileError => "file_error",
            ProcessingEvent::LyricsMove => "lyrics_move",
            ProcessingEvent::LyricsPlan => "lyrics_plan",
            ProcessingEvent::LyricsSkip => "lyrics_skip",
            ProcessingEvent::LyricsError => "lyrics_error",
            ProcessingEvent::ArtworkMove => "artwork_move",
            ProcessingEvent::ArtworkPlan => "artwork_plan",
            ProcessingEvent::ArtworkSkip => "artwork_skip",
            ProcessingEvent::ArtworkError => "artwork_error",
            ProcessingEvent::UnprocessedMove => "unprocessed_move",
            ProcessingEvent::RestoreMove => "restore_move",
            ProcessingEvent::RestorePlan => "restore_plan",
            ProcessingEvent::RestoreSkip => "restore_skip",
            ProcessingEvent::RestoreError => "restore_error",
        }
    }
}

impl fmt::Display for ProcessingEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
