//! Store traits used by the pipeline
//!
//! All methods take `&mut self` so a single connection (or transaction)
//! can back every store at once.

use crate::models::{PreviewEntry, RomanizationSource, TrackMetadata};
use async_trait::async_trait;
use omym_common::Result;
use std::path::{Path, PathBuf};

/// Original location of content, keyed by hash
#[async_trait]
pub trait BeforeStore: Send {
    /// Record `file_path` as the first-seen location of `file_hash`
    ///
    /// An existing row keeps its original path and only refreshes the tag
    /// snapshot. Returns the recorded original path.
    async fn record_before(
        &mut self,
        file_hash: &str,
        file_path: &Path,
        metadata: &TrackMetadata,
    ) -> Result<PathBuf>;

    async fn before_path(&mut self, file_hash: &str) -> Result<Option<PathBuf>>;
}

/// Organized location of content, keyed by hash
#[async_trait]
pub trait AfterStore: Send {
    async fn record_after(
        &mut self,
        file_hash: &str,
        file_path: &Path,
        target_path: &Path,
    ) -> Result<()>;

    async fn recorded_target(&mut self, file_hash: &str) -> Result<Option<PathBuf>>;
}

/// Cached romanization with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRomanization {
    pub romanized_name: String,
    pub source: Option<RomanizationSource>,
}

/// Case-insensitive artist cache
#[async_trait]
pub trait ArtistCacheStore: Send {
    async fn artist_id(&mut self, artist_name: &str) -> Result<Option<String>>;

    async fn upsert_artist_id(&mut self, artist_name: &str, artist_id: &str) -> Result<()>;

    async fn romanized_name(&mut self, artist_name: &str) -> Result<Option<CachedRomanization>>;

    async fn upsert_romanized_name(
        &mut self,
        artist_name: &str,
        romanized_name: &str,
        source: RomanizationSource,
    ) -> Result<()>;

    /// Whether upserts outlive this store
    fn persists_writes(&self) -> bool {
        true
    }
}

/// Dry-run decisions handed to the following real run
#[async_trait]
pub trait PreviewStore: Send {
    async fn preview(&mut self, file_hash: &str) -> Result<Option<PreviewEntry>>;

    /// Latest entry recorded for exactly this source and base path
    async fn preview_for_source(
        &mut self,
        source_path: &Path,
        base_path: &Path,
    ) -> Result<Option<PreviewEntry>>;

    async fn upsert_preview(&mut self, entry: &PreviewEntry) -> Result<()>;

    async fn delete_preview(&mut self, file_hash: &str) -> Result<()>;
}

/// Everything a batch needs from the store
pub trait StateStore: BeforeStore + AfterStore + ArtistCacheStore + PreviewStore {}

impl<T> StateStore for T where T: BeforeStore + AfterStore + ArtistCacheStore + PreviewStore + ?Sized {}
