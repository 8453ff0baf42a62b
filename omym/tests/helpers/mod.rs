//! Test helper utilities
//!
//! Audio fixtures are plain files whose content doubles as the tag lookup
//! key: [`FixtureTagReader`] maps content to metadata, so a fixture keeps its
//! tags wherever the organizer moves it and distinct content gives distinct
//! hashes.

#![allow(dead_code)]

use async_trait::async_trait;
use omym::config::ArtistNamePreferences;
use omym::models::TrackMetadata;
use omym::services::metadata_extractor::{MetadataError, MetadataExtractor, TagReader};
use omym::services::romanization::{RomanizationCoordinator, RomanizationLookup};
use omym::{MusicProcessor, ProcessorOptions};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Tag reader answering from a content → metadata table
#[derive(Default)]
pub struct FixtureTagReader {
    tags: Mutex<HashMap<String, TrackMetadata>>,
}

impl FixtureTagReader {
    pub fn insert(&self, content: &str, metadata: TrackMetadata) {
        self.tags.lock().unwrap().insert(content.to_string(), metadata);
    }
}

impl TagReader for FixtureTagReader {
    fn read_tags(&self, path: &Path) -> Result<TrackMetadata, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        self.tags
            .lock()
            .unwrap()
            .get(&content)
            .cloned()
            .ok_or_else(|| MetadataError::ReadError(format!("no tags in {}", path.display())))
    }
}

/// Romanization lookup with canned answers that counts its calls
pub struct CountingLookup {
    answers: HashMap<String, String>,
    calls: AtomicUsize,
}

impl CountingLookup {
    pub fn new(answers: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            answers: answers
                .iter()
                .map(|(name, answer)| (name.to_string(), answer.to_string()))
                .collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RomanizationLookup for CountingLookup {
    async fn fetch(&self, name: &str) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers.get(name).cloned()
    }
}

/// Tag set with the fields path generation uses
pub fn track(artist: &str, album: &str, title: &str, year: u32, number: u32) -> TrackMetadata {
    TrackMetadata {
        title: Some(title.to_string()),
        artist: Some(artist.to_string()),
        album: Some(album.to_string()),
        year: Some(year),
        track_number: Some(number),
        ..TrackMetadata::default()
    }
}

/// Source tree, library root and state database in one temp directory
pub struct TestLibrary {
    _dir: TempDir,
    pub source: PathBuf,
    pub library: PathBuf,
    pub db_path: PathBuf,
    pub reader: Arc<FixtureTagReader>,
}

impl TestLibrary {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("incoming");
        let library = dir.path().join("library");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::create_dir_all(&library).unwrap();

        Self {
            db_path: dir.path().join("state").join("omym.db"),
            source,
            library,
            reader: Arc::new(FixtureTagReader::default()),
            _dir: dir,
        }
    }

    /// Write an audio fixture at `relative` (under the source) with `metadata`
    pub fn add_track(&self, relative: &str, metadata: TrackMetadata) -> PathBuf {
        let content = format!("audio:{}", relative);
        self.reader.insert(&content, metadata);
        self.add_file(relative, content.as_bytes())
    }

    /// Write an arbitrary file under the source
    pub fn add_file(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.source.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }

    pub async fn pool(&self) -> SqlitePool {
        omym_common::db::init_database(&self.db_path).await.unwrap()
    }

    /// Processor organizing into the library root
    pub fn processor(
        &self,
        pool: &SqlitePool,
        dry_run: bool,
        lookup: Option<Arc<dyn RomanizationLookup>>,
    ) -> MusicProcessor {
        self.processor_into(pool, &self.library, dry_run, lookup)
    }

    pub fn processor_into(
        &self,
        pool: &SqlitePool,
        base_path: &Path,
        dry_run: bool,
        lookup: Option<Arc<dyn RomanizationLookup>>,
    ) -> MusicProcessor {
        let mut options = ProcessorOptions::new(base_path);
        options.dry_run = dry_run;

        MusicProcessor::new(
            pool.clone(),
            options,
            MetadataExtractor::new(self.reader.clone()),
            RomanizationCoordinator::new(ArtistNamePreferences::default(), lookup),
        )
    }
}

/// Every regular file below `root`, relative and sorted
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
        .collect();
    files.sort();
    files
}
