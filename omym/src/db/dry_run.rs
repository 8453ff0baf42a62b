//! Dry-run store overlay
//!
//! Reads go to the wrapped store. Artist-cache writes stay in memory so a
//! plan never changes cached IDs or romanizations; before/after writes are
//! dropped. Preview writes pass through: recording them is the point of a
//! dry run.

use super::ports::{AfterStore, ArtistCacheStore, BeforeStore, CachedRomanization, PreviewStore, StateStore};
use crate::models::{PreviewEntry, RomanizationSource, TrackMetadata};
use async_trait::async_trait;
use omym_common::Result;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub struct DryRunStore<'a, S: StateStore + ?Sized> {
    inner: &'a mut S,
    artist_ids: HashMap<String, String>,
    romanizations: HashMap<String, CachedRomanization>,
}

impl<'a, S: StateStore + ?Sized> DryRunStore<'a, S> {
    pub fn new(inner: &'a mut S) -> Self {
        Self {
            inner,
            artist_ids: HashMap::new(),
            romanizations: HashMap::new(),
        }
    }
}

fn cache_key(artist_name: &str) -> String {
    artist_name.trim().to_lowercase()
}

#[async_trait]
impl<'a, S: StateStore + ?Sized> BeforeStore for DryRunStore<'a, S> {
    async fn record_before(
        &mut self,
        _file_hash: &str,
        file_path: &Path,
        _metadata: &TrackMetadata,
    ) -> Result<PathBuf> {
        Ok(file_path.to_path_buf())
    }

    async fn before_path(&mut self, file_hash: &str) -> Result<Option<PathBuf>> {
        self.inner.before_path(file_hash).await
    }
}

#[async_trait]
impl<'a, S: StateStore + ?Sized> AfterStore for DryRunStore<'a, S> {
    async fn record_after(&mut self, _: &str, _: &Path, _: &Path) -> Result<()> {
        Ok(())
    }

    async fn recorded_target(&mut self, file_hash: &str) -> Result<Option<PathBuf>> {
        self.inner.recorded_target(file_hash).await
    }
}

#[async_trait]
impl<'a, S: StateStore + ?Sized> ArtistCacheStore for DryRunStore<'a, S> {
    async fn artist_id(&mut self, artist_name: &str) -> Result<Option<String>> {
        if let Some(id) = self.artist_ids.get(&cache_key(artist_name)) {
            return Ok(Some(id.clone()));
        }
        self.inner.artist_id(artist_name).await
    }

    async fn upsert_artist_id(&mut self, artist_name: &str, artist_id: &str) -> Result<()> {
        self.artist_ids
            .insert(cache_key(artist_name), artist_id.to_string());
        Ok(())
    }

    async fn romanized_name(&mut self, artist_name: &str) -> Result<Option<CachedRomanization>> {
        if let Some(cached) = self.romanizations.get(&cache_key(artist_name)) {
            return Ok(Some(cached.clone()));
        }
        self.inner.romanized_name(artist_name).await
    }

    async fn upsert_romanized_name(
        &mut self,
        artist_name: &str,
        romanized_name: &str,
        source: RomanizationSource,
    ) -> Result<()> {
        self.romanizations.insert(
            cache_key(artist_name),
            CachedRomanization {
                romanized_name: romanized_name.to_string(),
                source: Some(source),
            },
        );
        Ok(())
    }
    fn persists_writes(&self) -> bool {
        false
    }
}

#[async_trait]
impl<'a, S: StateStore + ?Sized> PreviewStore for DryRunStore<'a, S> {
    async fn preview(&mut self, file_hash: &str) -> Result<Option<PreviewEntry>> {
        self.inner.preview(file_hash).await
    }

    async fn preview_for_source(
        &mut self,
        source_path: &Path,
        base_path: &Path,
    ) -> Result<Option<PreviewEntry>> {
        self.inner.preview_for_source(source_path, base_path).await
    }

    async fn upsert_preview(&mut self, entry: &PreviewEntry) -> Result<()> {
        self.inner.upsert_preview(entry).await
    }

    async fn delete_preview(&mut self, file_hash: &str) -> Result<()> {
        self.inner.delete_preview(file_hash).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;

    #[tokio::test]
    async fn test_artist_writes_stay_in_memory() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        conn.upsert_artist_id("Blur", "BLR").await.unwrap();

        {
            let mut dry = DryRunStore::new(&mut *conn);
            dry.upsert_artist_id("Queen", "QUEEN").await.unwrap();
            dry.upsert_romanized_name("ひかる", "Hikaru", RomanizationSource::FallbackTransliteration)
                .await
                .unwrap();

            assert_eq!(dry.artist_id("QUEEN").await.unwrap().as_deref(), Some("QUEEN"));
            assert_eq!(dry.artist_id("blur").await.unwrap().as_deref(), Some("BLR"));
            assert_eq!(
                dry.romanized_name("ひかる").await.unwrap().map(|c| c.romanized_name),
                Some("Hikaru".to_string())
            );
        }

        assert_eq!(conn.artist_id("Queen").await.unwrap(), None);
        assert_eq!(conn.romanized_name("ひかる").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_state_writes_are_dropped() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        {
            let mut dry = DryRunStore::new(&mut *conn);
            dry.record_before("h", Path::new("/in/a.mp3"), &TrackMetadata::default())
                .await
                .unwrap();
            dry.record_after("h", Path::new("/in/a.mp3"), Path::new("/lib/a.mp3"))
                .await
                .unwrap();
        }

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processing_before")
            .fetch_one(&mut *conn)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
