//! Target path generation
//!
//! Layout: `{AlbumArtist}/{Year}_{Album}/[D{disc}_]{track}_{Title}_{ArtistID}.{ext}`
//!
//! Album-level facts (latest year, track-number width, whether discs need a
//! prefix) come from a [`PathContext`] owned by one batch. The directory
//! runner registers every track during its pre-scan, so the result does not
//! depend on the order files are processed in.

use crate::models::TrackMetadata;
use crate::services::sanitizer::{sanitize_album, sanitize_artist, sanitize_title};
use crate::utils::fs::is_same_file;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

pub const UNKNOWN_ARTIST: &str = "Unknown-Artist";
pub const UNKNOWN_ALBUM: &str = "Unknown-Album";
const MISSING_TRACK: &str = "XX";
const MIN_TRACK_WIDTH: usize = 2;

/// Per-batch album aggregation and reserved targets
#[derive(Debug, Default)]
pub struct PathContext {
    album_years: HashMap<String, u32>,
    track_widths: HashMap<String, usize>,
    disc_prefix_albums: HashSet<String>,
    reserved: HashSet<PathBuf>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn artist_component(metadata: &TrackMetadata) -> String {
    let raw = non_blank(&metadata.album_artist)
        .or_else(|| non_blank(&metadata.artist))
        .unwrap_or(UNKNOWN_ARTIST);
    let sanitized = sanitize_artist(raw);
    if sanitized.is_empty() {
        UNKNOWN_ARTIST.to_string()
    } else {
        sanitized
    }
}

fn album_component(metadata: &TrackMetadata) -> String {
    let raw = non_blank(&metadata.album).unwrap_or(UNKNOWN_ALBUM);
    let sanitized = sanitize_album(raw);
    if sanitized.is_empty() {
        UNKNOWN_ALBUM.to_string()
    } else {
        sanitized
    }
}

/// Key that groups tracks of one album
pub fn album_key(metadata: &TrackMetadata) -> String {
    format!("{}|{}", artist_component(metadata), album_component(metadata))
}

fn digits(n: u32) -> usize {
    n.to_string().len()
}

impl PathContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record album-level facts of one track
    pub fn register(&mut self, metadata: &TrackMetadata) {
        let key = album_key(metadata);

        if let Some(year) = metadata.year.filter(|y| *y > 0) {
            let entry = self.album_years.entry(key.clone()).or_insert(year);
            *entry = (*entry).max(year);
        }

        if let Some(number) = metadata.track_number.filter(|n| *n > 0) {
            let width = digits(number).max(MIN_TRACK_WIDTH);
            let entry = self.track_widths.entry(key.clone()).or_insert(width);
            *entry = (*entry).max(width);
        }

        let multi_disc = metadata.disc_total.is_some_and(|t| t > 1)
            || metadata.disc_number.is_some_and(|n| n > 1);
        if multi_disc {
            self.disc_prefix_albums.insert(key);
        }
    }

    /// Latest year registered for the track's album (0 when unknown)
    pub fn album_year(&self, metadata: &TrackMetadata) -> u32 {
        self.album_years
            .get(&album_key(metadata))
            .copied()
            .or(metadata.year)
            .unwrap_or(0)
    }

    /// Mark `path` as taken by another file in this batch
    pub fn reserve(&mut self, path: &Path) {
        self.reserved.insert(path.to_path_buf());
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.reserved.contains(path)
    }

    /// `{Artist}/{Year}_{Album}` relative to the library root
    pub fn directory_name(&self, metadata: &TrackMetadata) -> PathBuf {
        let year = self.album_year(metadata);
        PathBuf::from(artist_component(metadata))
            .join(format!("{:04}_{}", year, album_component(metadata)))
    }

    /// `[D{disc}_]{track}_{Title}_{ArtistID}.{ext}`
    pub fn file_name(&self, metadata: &TrackMetadata, artist_id: &str) -> String {
        let key = album_key(metadata);

        let disc = match metadata.disc_number {
            Some(disc) if disc > 0 && self.disc_prefix_albums.contains(&key) => {
                format!("D{}_", disc)
            }
            _ => String::new(),
        };

        let track = match metadata.track_number.filter(|n| *n > 0) {
            Some(n) => {
                let width = self
                    .track_widths
                    .get(&key)
                    .copied()
                    .unwrap_or(MIN_TRACK_WIDTH);
                format!("{:0width$}", n, width = width)
            }
            None => MISSING_TRACK.to_string(),
        };

        let title = sanitize_title(metadata.title.as_deref().unwrap_or(""));

        format!(
            "{}{}_{}_{}{}",
            disc,
            track,
            title,
            artist_id,
            metadata.file_extension.to_lowercase()
        )
    }

    /// Register `metadata` and return its path relative to the library root
    pub fn relative_path(&mut self, metadata: &TrackMetadata, artist_id: &str) -> PathBuf {
        self.register(metadata);
        self.directory_name(metadata)
            .join(self.file_name(metadata, artist_id))
    }

    /// First free variant of `candidate`: itself, then `"name (n).ext"`
    ///
    /// A path counts as free when nothing exists there and no other file of
    /// this batch reserved it. A path holding `existing` itself (same file
    /// on disk) is returned as-is.
    pub fn find_available_target(&self, candidate: &Path, existing: Option<&Path>) -> PathBuf {
        let mut n = 0u32;
        loop {
            let path = if n == 0 {
                candidate.to_path_buf()
            } else {
                numbered(candidate, n)
            };

            if let Some(existing) = existing {
                if is_same_file(&path, existing) {
                    return path;
                }
            }

            if !self.is_reserved(&path) && !path.exists() {
                return path;
            }
            n += 1;
        }
    }
}

fn numbered(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{} ({}).{}", stem, n, ext.to_string_lossy()),
        None => format!("{} ({})", stem, n),
    };
    path.with_file_name(name)
}
