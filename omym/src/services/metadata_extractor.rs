//! Audio tag extraction
//!
//! [`TagReader`] is the seam to the tag library; [`LoftyTagReader`] is the
//! production implementation. [`MetadataExtractor`] checks the extension,
//! calls the reader and normalizes the result (trimmed strings, blanks as
//! `None`, lower-case extension).

use crate::models::TrackMetadata;
use lofty::file::TaggedFileExt;
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::ItemKey;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Extensions (lower case, with dot) the organizer handles
pub const SUPPORTED_AUDIO_EXTENSIONS: &[&str] =
    &[".mp3", ".flac", ".m4a", ".dsf", ".aac", ".alac", ".opus"];

/// Metadata extraction errors
#[derive(Debug, Error)]
pub enum MetadataError {
    /// Tag library could not read the file
    #[error("Failed to read tags: {0}")]
    ReadError(String),

    /// Unsupported audio format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// I/O error (file read)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Lower-case extension with leading dot (".flac"), if any
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

/// True for files with a supported audio extension
pub fn is_supported_audio(path: &Path) -> bool {
    file_extension(path)
        .map(|ext| SUPPORTED_AUDIO_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Reads raw tags from one file
pub trait TagReader: Send + Sync {
    fn read_tags(&self, path: &Path) -> Result<TrackMetadata, MetadataError>;
}

/// Tag reader backed by lofty
#[derive(Debug, Default, Clone, Copy)]
pub struct LoftyTagReader;

impl TagReader for LoftyTagReader {
    fn read_tags(&self, path: &Path) -> Result<TrackMetadata, MetadataError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| MetadataError::ReadError(e.to_string()))?
            .read()
            .map_err(|e| MetadataError::ReadError(e.to_string()))?;

        // Untagged files still organize (under Unknown-* placeholders)
        let Some(tag) = tagged_file.primary_tag().or_else(|| tagged_file.first_tag()) else {
            return Ok(TrackMetadata::default());
        };

        Ok(TrackMetadata {
            title: tag.title().map(|s| s.to_string()),
            artist: tag.artist().map(|s| s.to_string()),
            album: tag.album().map(|s| s.to_string()),
            album_artist: tag.get_string(&ItemKey::AlbumArtist).map(str::to_string),
            genre: tag.genre().map(|s| s.to_string()),
            year: tag.year(),
            track_number: tag.track(),
            track_total: tag.track_total(),
            disc_number: tag.disk(),
            disc_total: tag.disk_total(),
            file_extension: String::new(),
        })
    }
}

/// Metadata extractor service
#[derive(Clone)]
pub struct MetadataExtractor {
    reader: Arc<dyn TagReader>,
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new(Arc::new(LoftyTagReader))
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl MetadataExtractor {
    pub fn new(reader: Arc<dyn TagReader>) -> Self {
        Self { reader }
    }

    /// Extract normalized metadata from a supported audio file
    pub fn extract(&self, path: &Path) -> Result<TrackMetadata, MetadataError> {
        let extension = file_extension(path).unwrap_or_default();
        if !SUPPORTED_AUDIO_EXTENSIONS.contains(&extension.as_str()) {
            return Err(MetadataError::UnsupportedFormat(path.display().to_string()));
        }

        let raw = self.reader.read_tags(path)?;
        let metadata = TrackMetadata {
            title: clean(raw.title),
            artist: clean(raw.artist),
            album: clean(raw.album),
            album_artist: clean(raw.album_artist),
            genre: clean(raw.genre),
            year: raw.year.filter(|y| *y > 0),
            track_number: raw.track_number,
            track_total: raw.track_total,
            disc_number: raw.disc_number,
            disc_total: raw.disc_total,
            file_extension: extension,
        };

        tracing::debug!(
            file = %path.display(),
            artist = ?metadata.artist,
            title = ?metadata.title,
            album = ?metadata.album,
            "Extracted metadata"
        );
        Ok(metadata)
    }
}
