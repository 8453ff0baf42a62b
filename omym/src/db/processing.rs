//! Before/after state on SQLite

use super::ports::{AfterStore, BeforeStore};
use super::{path_from_db, path_to_db};
use crate::models::TrackMetadata;
use async_trait::async_trait;
use omym_common::Result;
use sqlx::SqliteConnection;
use std::path::{Path, PathBuf};

fn opt_i64(value: Option<u32>) -> Option<i64> {
    value.map(i64::from)
}

#[async_trait]
impl BeforeStore for SqliteConnection {
    async fn record_before(
        &mut self,
        file_hash: &str,
        file_path: &Path,
        metadata: &TrackMetadata,
    ) -> Result<PathBuf> {
        let path = path_to_db(file_path);

        // Different content previously seen at this path no longer lives there
        sqlx::query("DELETE FROM processing_before WHERE file_path = ? AND file_hash != ?")
            .bind(&path)
            .bind(file_hash)
            .execute(&mut *self)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO processing_before (
                file_hash, file_path, title, artist, album, album_artist, genre,
                year, track_number, total_tracks, disc_number, total_discs
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_hash) DO UPDATE SET
                title = excluded.title,
                artist = excluded.artist,
                album = excluded.album,
                album_artist = excluded.album_artist,
                genre = excluded.genre,
                year = excluded.year,
                track_number = excluded.track_number,
                total_tracks = excluded.total_tracks,
                disc_number = excluded.disc_number,
                total_discs = excluded.total_discs,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(file_hash)
        .bind(&path)
        .bind(&metadata.title)
        .bind(&metadata.artist)
        .bind(&metadata.album)
        .bind(&metadata.album_artist)
        .bind(&metadata.genre)
        .bind(opt_i64(metadata.year))
        .bind(opt_i64(metadata.track_number))
        .bind(opt_i64(metadata.track_total))
        .bind(opt_i64(metadata.disc_number))
        .bind(opt_i64(metadata.disc_total))
        .execute(&mut *self)
        .await?;

        let original: String =
            sqlx::query_scalar("SELECT file_path FROM processing_before WHERE file_hash = ?")
                .bind(file_hash)
                .fetch_one(&mut *self)
                .await?;

        Ok(path_from_db(original))
    }

    async fn before_path(&mut self, file_hash: &str) -> Result<Option<PathBuf>> {
        let path: Option<String> =
            sqlx::query_scalar("SELECT file_path FROM processing_before WHERE file_hash = ?")
                .bind(file_hash)
                .fetch_optional(&mut *self)
                .await?;

        Ok(path.map(path_from_db))
    }
}

#[async_trait]
impl AfterStore for SqliteConnection {
    async fn record_after(
        &mut self,
        file_hash: &str,
        file_path: &Path,
        target_path: &Path,
    ) -> Result<()> {
        let path = path_to_db(file_path);

        sqlx::query("DELETE FROM processing_after WHERE file_path = ? AND file_hash != ?")
            .bind(&path)
            .bind(file_hash)
            .execute(&mut *self)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO processing_after (file_hash, file_path, target_path)
            VALUES (?, ?, ?)
            ON CONFLICT(file_hash) DO UPDATE SET
                file_path = excluded.file_path,
                target_path = excluded.target_path,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(file_hash)
        .bind(&path)
        .bind(path_to_db(target_path))
        .execute(&mut *self)
        .await?;

        Ok(())
    }

    async fn recorded_target(&mut self, file_hash: &str) -> Result<Option<PathBuf>> {
        let target: Option<String> =
            sqlx::query_scalar("SELECT target_path FROM processing_after WHERE file_hash = ?")
                .bind(file_hash)
                .fetch_optional(&mut *self)
                .await?;

        Ok(target.map(path_from_db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;

    fn metadata(title: &str) -> TrackMetadata {
        TrackMetadata {
            title: Some(title.to_string()),
            artist: Some("Artist".to_string()),
            year: Some(2001),
            track_number: Some(3),
            file_extension: ".mp3".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_record_before_keeps_first_seen_path() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = conn
            .record_before("hash1", Path::new("/music/in/a.mp3"), &metadata("A"))
            .await
            .unwrap();
        assert_eq!(first, PathBuf::from("/music/in/a.mp3"));

        let second = conn
            .record_before("hash1", Path::new("/library/A/a.mp3"), &metadata("A2"))
            .await
            .unwrap();
        assert_eq!(second, PathBuf::from("/music/in/a.mp3"));

        let title: String =
            sqlx::query_scalar("SELECT title FROM processing_before WHERE file_hash = 'hash1'")
                .fetch_one(&mut *conn)
                .await
                .unwrap();
        assert_eq!(title, "A2");
    }

    #[tokio::test]
    async fn test_record_before_replaces_other_content_at_same_path() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        conn.record_before("old", Path::new("/in/a.mp3"), &metadata("A"))
            .await
            .unwrap();
        conn.record_before("new", Path::new("/in/a.mp3"), &metadata("A"))
            .await
            .unwrap();

        assert_eq!(conn.before_path("old").await.unwrap(), None);
        assert_eq!(
            conn.before_path("new").await.unwrap(),
            Some(PathBuf::from("/in/a.mp3"))
        );
    }

    #[tokio::test]
    async fn test_record_after_upserts_target() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        conn.record_before("hash1", Path::new("/in/a.mp3"), &metadata("A"))
            .await
            .unwrap();
        conn.record_after("hash1", Path::new("/in/a.mp3"), Path::new("/lib/one.mp3"))
            .await
            .unwrap();
        conn.record_after("hash1", Path::new("/in/a.mp3"), Path::new("/lib/two.mp3"))
            .await
            .unwrap();

        assert_eq!(
            conn.recorded_target("hash1").await.unwrap(),
            Some(PathBuf::from("/lib/two.mp3"))
        );
        assert_eq!(conn.recorded_target("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_record_after_requires_before_row() {
        let pool = memory_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let result = conn
            .record_after("orphan", Path::new("/in/a.mp3"), Path::new("/lib/a.mp3"))
            .await;
        assert!(result.is_err());
    }
}
