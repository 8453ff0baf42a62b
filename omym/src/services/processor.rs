//! Organize entry point
//!
//! [`MusicProcessor`] owns what outlives a single batch: the database pool,
//! the tag extractor and the romanization coordinator (so a plan and the
//! following organize in one process share decisions). Each call to
//! [`MusicProcessor::process_path`] runs one batch.

use crate::config::{ArtistNamePreferences, Settings};
use crate::error::{OrganizeError, OrganizeResult};
use crate::models::DirectoryReport;
use crate::services::directory_runner;
use crate::services::metadata_extractor::{is_supported_audio, MetadataExtractor};
use crate::services::musicbrainz_client::MusicBrainzClient;
use crate::services::romanization::{RomanizationCoordinator, RomanizationLookup};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Per-processor options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessorOptions {
    /// Library root that receives organized files
    pub base_path: PathBuf,
    pub dry_run: bool,
    /// Quarantine folder name under an organized source directory
    pub unprocessed_dir_name: String,
}

impl ProcessorOptions {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            dry_run: false,
            unprocessed_dir_name: crate::config::DEFAULT_UNPROCESSED_DIR_NAME.to_string(),
        }
    }
}

/// Organize pipeline service
pub struct MusicProcessor {
    pub(crate) db: SqlitePool,
    pub(crate) options: ProcessorOptions,
    pub(crate) extractor: MetadataExtractor,
    pub(crate) romanization: RomanizationCoordinator,
}

impl MusicProcessor {
    pub fn new(
        db: SqlitePool,
        options: ProcessorOptions,
        extractor: MetadataExtractor,
        romanization: RomanizationCoordinator,
    ) -> Self {
        Self {
            db,
            options,
            extractor,
            romanization,
        }
    }

    /// Build a processor from resolved settings with the lofty tag reader
    pub fn from_settings(
        db: SqlitePool,
        settings: &Settings,
        options: ProcessorOptions,
        preferences: ArtistNamePreferences,
    ) -> Self {
        let lookup: Option<Arc<dyn RomanizationLookup>> = if settings.use_mb_romanization {
            match MusicBrainzClient::new(&settings.musicbrainz) {
                Ok(client) => {
                    tracing::info!(
                        user_agent = %settings.musicbrainz.user_agent(),
                        "MusicBrainz romanization enabled"
                    );
                    Some(Arc::new(client) as Arc<dyn RomanizationLookup>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to initialize MusicBrainz client; using local transliteration");
                    None
                }
            }
        } else {
            tracing::info!("MusicBrainz romanization disabled; using local transliteration");
            None
        };

        Self::new(
            db,
            options,
            MetadataExtractor::default(),
            RomanizationCoordinator::new(preferences, lookup),
        )
    }

    pub fn options(&self) -> &ProcessorOptions {
        &self.options
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.options.dry_run = dry_run;
    }

    pub fn romanization(&self) -> &RomanizationCoordinator {
        &self.romanization
    }

    /// Organize a directory, or a single supported audio file
    pub async fn process_path(&mut self, path: &Path) -> OrganizeResult<DirectoryReport> {
        let report = if path.is_dir() {
            directory_runner::process_directory(self, path).await?
        } else if path.is_file() && is_supported_audio(path) {
            directory_runner::process_single_file(self, path).await?
        } else {
            return Err(OrganizeError::NotADirectory(path.to_path_buf()));
        };

        self.save_preferences();
        Ok(report)
    }

    /// Persist preference placeholders discovered so far (best effort)
    pub fn save_preferences(&mut self) {
        if let Err(e) = self.romanization.preferences_mut().save_if_changed() {
            tracing::warn!(error = %e, "Failed to save artist name preferences");
        }
    }
}
