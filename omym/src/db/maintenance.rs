//! Pool-level maintenance: cache clearing and restore queries

use super::path_from_db;
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use omym_common::Result;
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};

/// After-state row joined for restoration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AfterRecord {
    pub file_hash: String,
    /// Original location
    pub file_path: PathBuf,
    /// Organized location
    pub target_path: PathBuf,
}

/// Delete every artist-cache row
pub async fn clear_artist_cache(pool: &SqlitePool) -> Result<u64> {
    retry_on_lock("clear artist cache", DEFAULT_MAX_LOCK_WAIT_MS, move || async move {
        let deleted = sqlx::query("DELETE FROM artist_cache")
            .execute(pool)
            .await?
            .rows_affected();
        Ok::<_, omym_common::Error>(deleted)
    })
    .await
}

/// Delete before/after/preview rows
pub async fn clear_processing_state(pool: &SqlitePool) -> Result<()> {
    retry_on_lock("clear processing state", DEFAULT_MAX_LOCK_WAIT_MS, move || async move {
        let mut tx = pool.begin().await?;
        sqlx::query("DELETE FROM processing_after").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM processing_before").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM processing_preview").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok::<_, omym_common::Error>(())
    })
    .await
}

/// Delete processing state and the artist cache
pub async fn clear_all_state(pool: &SqlitePool) -> Result<()> {
    clear_processing_state(pool).await?;
    clear_artist_cache(pool).await?;
    Ok(())
}

/// After-state rows whose target lies under `root`, ordered by target
pub async fn after_records_under(
    pool: &SqlitePool,
    root: &Path,
    limit: Option<usize>,
) -> Result<Vec<AfterRecord>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT file_hash, file_path, target_path FROM processing_after ORDER BY target_path",
    )
    .fetch_all(pool)
    .await?;

    let records = rows
        .into_iter()
        .map(|(file_hash, file_path, target_path)| AfterRecord {
            file_hash,
            file_path: path_from_db(file_path),
            target_path: path_from_db(target_path),
        })
        // Component-wise prefix match, so "/lib2" is not under "/lib"
        .filter(|record| record.target_path.starts_with(root))
        .take(limit.unwrap_or(usize::MAX))
        .collect();

    Ok(records)
}

/// Number of after-state rows (used by summaries and tests)
pub async fn after_count(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processing_after")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ports::{AfterStore, ArtistCacheStore, BeforeStore};
    use crate::db::test_support::memory_pool;
    use crate::models::TrackMetadata;

    async fn seed(pool: &SqlitePool, hash: &str, original: &str, target: &str) {
        let mut conn = pool.acquire().await.unwrap();
        conn.record_before(hash, Path::new(original), &TrackMetadata::default())
            .await
            .unwrap();
        conn.record_after(hash, Path::new(original), Path::new(target))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_after_records_under_root() {
        let pool = memory_pool().await;
        seed(&pool, "b", "/in/b.mp3", "/lib/B/b.mp3").await;
        seed(&pool, "a", "/in/a.mp3", "/lib/A/a.mp3").await;
        seed(&pool, "c", "/in/c.mp3", "/lib2/C/c.mp3").await;

        let records = after_records_under(&pool, Path::new("/lib"), None).await.unwrap();
        let hashes: Vec<_> = records.iter().map(|r| r.file_hash.as_str()).collect();
        assert_eq!(hashes, vec!["a", "b"]);

        let limited = after_records_under(&pool, Path::new("/lib"), Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_state() {
        let pool = memory_pool().await;
        seed(&pool, "a", "/in/a.mp3", "/lib/A/a.mp3").await;
        {
            let mut conn = pool.acquire().await.unwrap();
            conn.upsert_artist_id("Blur", "BLR").await.unwrap();
        }

        assert_eq!(clear_artist_cache(&pool).await.unwrap(), 1);
        clear_processing_state(&pool).await.unwrap();
        assert_eq!(after_count(&pool).await.unwrap(), 0);
    }
}
