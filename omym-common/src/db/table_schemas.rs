//! Table Schema Definitions
//!
//! Declared columns for every state table. Adding a column here is enough
//! for existing databases to pick it up on the next start.

use crate::db::schema_sync::{ColumnDefinition, SchemaSync, TableSchema};
use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

fn timestamps() -> [ColumnDefinition; 2] {
    [
        ColumnDefinition::new("created_at", "TIMESTAMP")
            .not_null()
            .default("CURRENT_TIMESTAMP"),
        ColumnDefinition::new("updated_at", "TIMESTAMP")
            .not_null()
            .default("CURRENT_TIMESTAMP"),
    ]
}

/// Before-state table
pub struct ProcessingBeforeSchema;

impl TableSchema for ProcessingBeforeSchema {
    fn table_name() -> &'static str {
        "processing_before"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        let mut columns = vec![
            ColumnDefinition::new("file_hash", "TEXT").primary_key(),
            ColumnDefinition::new("file_path", "TEXT").not_null(),
            ColumnDefinition::new("title", "TEXT"),
            ColumnDefinition::new("artist", "TEXT"),
            ColumnDefinition::new("album", "TEXT"),
            ColumnDefinition::new("album_artist", "TEXT"),
            ColumnDefinition::new("genre", "TEXT"),
            ColumnDefinition::new("year", "INTEGER"),
            ColumnDefinition::new("track_number", "INTEGER"),
            ColumnDefinition::new("total_tracks", "INTEGER"),
            ColumnDefinition::new("disc_number", "INTEGER"),
            ColumnDefinition::new("total_discs", "INTEGER"),
        ];
        columns.extend(timestamps());
        columns
    }
}

/// After-state table
pub struct ProcessingAfterSchema;

impl TableSchema for ProcessingAfterSchema {
    fn table_name() -> &'static str {
        "processing_after"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        let mut columns = vec![
            ColumnDefinition::new("file_hash", "TEXT").primary_key(),
            ColumnDefinition::new("file_path", "TEXT").not_null(),
            ColumnDefinition::new("target_path", "TEXT").not_null(),
        ];
        columns.extend(timestamps());
        columns
    }
}

/// Artist cache table
pub struct ArtistCacheSchema;

impl TableSchema for ArtistCacheSchema {
    fn table_name() -> &'static str {
        "artist_cache"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        let mut columns = vec![
            ColumnDefinition::new("id", "INTEGER").primary_key(),
            ColumnDefinition::new("artist_name", "TEXT").not_null(),
            ColumnDefinition::new("artist_id", "TEXT"),
            // Romanization columns arrived after the first release
            ColumnDefinition::new("romanized_name", "TEXT"),
            ColumnDefinition::new("romanization_source", "TEXT"),
            ColumnDefinition::new("romanized_at", "TIMESTAMP"),
        ];
        columns.extend(timestamps());
        columns
    }
}

/// Preview cache table
pub struct ProcessingPreviewSchema;

impl TableSchema for ProcessingPreviewSchema {
    fn table_name() -> &'static str {
        "processing_preview"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("file_hash", "TEXT").primary_key(),
            ColumnDefinition::new("source_path", "TEXT").not_null(),
            ColumnDefinition::new("base_path", "TEXT").not_null(),
            ColumnDefinition::new("target_path", "TEXT"),
            ColumnDefinition::new("payload_json", "TEXT")
                .not_null()
                .default("'{}'"),
            ColumnDefinition::new("updated_at", "TIMESTAMP")
                .not_null()
                .default("CURRENT_TIMESTAMP"),
        ]
    }
}

/// Synchronize all table schemas
///
/// Runs after `CREATE TABLE IF NOT EXISTS` and before migrations.
pub async fn sync_all_table_schemas(pool: &SqlitePool) -> Result<()> {
    let mut added = Vec::new();
    added.extend(SchemaSync::sync_table::<ProcessingBeforeSchema>(pool).await?);
    added.extend(SchemaSync::sync_table::<ProcessingAfterSchema>(pool).await?);
    added.extend(SchemaSync::sync_table::<ArtistCacheSchema>(pool).await?);
    added.extend(SchemaSync::sync_table::<ProcessingPreviewSchema>(pool).await?);

    if !added.is_empty() {
        info!(columns = ?added, "Schema synchronization added columns");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_state_tables;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_test_db() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_tables_match_declarations() {
        let pool = setup_test_db().await;
        create_state_tables(&pool).await.unwrap();

        assert!(SchemaSync::sync_table::<ProcessingBeforeSchema>(&pool).await.unwrap().is_empty());
        assert!(SchemaSync::sync_table::<ProcessingAfterSchema>(&pool).await.unwrap().is_empty());
        assert!(SchemaSync::sync_table::<ArtistCacheSchema>(&pool).await.unwrap().is_empty());
        assert!(SchemaSync::sync_table::<ProcessingPreviewSchema>(&pool).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_legacy_artist_cache_gains_romanization_columns() {
        let pool = setup_test_db().await;

        // Layout written before romanization existed
        sqlx::query(
            r#"
            CREATE TABLE artist_cache (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                artist_name TEXT NOT NULL UNIQUE,
                artist_id TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let added = SchemaSync::sync_table::<ArtistCacheSchema>(&pool).await.unwrap();
        assert_eq!(added, vec!["romanized_name", "romanization_source", "romanized_at"]);
    }
}
