//! Artist cache on SQLite
//!
//! Names are trimmed and compared with `COLLATE NOCASE`, so "Queen" and
//! "QUEEN" share one row. Upserts update first and insert only when no row
//! matched, which keeps the originally stored spelling.

use super::ports::{ArtistCacheStore, CachedRomanization};
use crate::models::RomanizationSource;
use async_trait::async_trait;
use omym_common::Result;
use sqlx::SqliteConnection;

#[async_trait]
impl ArtistCacheStore for SqliteConnection {
    async fn artist_id(&mut self, artist_name: &str) -> Result<Option<String>> {
        let id: Option<Option<String>> = sqlx::query_scalar(
            "SELECT artist_id FROM artist_cache WHERE artist_name = ? COLLATE NOCASE",
        )
        .bind(artist_name.trim())
        .fetch_optional(&mut *self)
        .await?;

        Ok(id.flatten())
    }

    async fn upsert_artist_id(&mut self, artist_name: &str, artist_id: &str) -> Result<()> {
        let name = artist_name.trim();

        let updated = sqlx::query(
            r#"
            UPDATE artist_cache
            SET artist_id = ?, updated_at = CURRENT_TIMESTAMP
            WHERE artist_name = ? COLLATE NOCASE
            "#,
        )
        .bind(artist_id)
        .bind(name)
        .execute(&mut *self)
        .await?
        .rows_affected();

        if updated == 0 {
            sqlx::query("INSERT INTO artist_cache (artist_name, artist_id) VALUES (?, ?)")
                .bind(name)
                .bind(artist_id)
                .execute(&mut *self)
                .await?;
        }

        Ok(())
    }

    async fn romanized_name(&mut self, artist_name: &str) -> Result<Option<CachedRomanization>> {
        let row: Option<(Option<String>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT romanized_name, romanization_source
            FROM artist_cache
            WHERE artist_name = ? COLLATE NOCASE
            "#,
        )
        .bind(artist_name.trim())
        .fetch_optional(&mut *self)
        .await?;

        Ok(row.and_then(|(romanized, source)| {
            let romanized_name = romanized.filter(|r| !r.trim().is_empty())?;
            Some(CachedRomanization {
                romanized_name,
                source: source.and_then(|s| s.parse().ok()),
            })
        }))
    }

    async fn upsert_romanized_name(
        &mut self,
        artist_name: &str,
        romanized_name: &str,
        source: RomanizationSource,
    ) -> Result<()> {
        let name = artist_name.trim();

        let updated = sqlx::query(
            r#"
            UPDATE artist_cache
            SET romanized_name = ?,
                romanization_source = ?,
                romanized_at = CURRENT_TIMESTAMP,
                updated_at = CURRENT_TIMESTAMP
            WHERE artist_name = ? COLLATE NOCASE
            "#,
        )
        .bind(romanized_name)
        .bind(source.as_str())
        .bind(name)
        .execute(&mut *self)
        .await?
        .rows_affected();

        if updated == 0 {
            sqlx::query(
                r#"
                INSERT INTO artist_cache (artist_name, romanized_name, romanization_source, romanized_at)
                VALUES (?, ?, ?, CURRENT_TIMESTAMP)
                "#,
            )
            .bind(name)
            .bind(romanized_name)
            .bind(source.as_str())
            .execute(&mut *self)
            .await?;
        }

        Ok(())
    }
}
