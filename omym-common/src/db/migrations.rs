//! Database schema migrations
//!
//! Versioned transformations that column sync cannot perform. Versions are
//! recorded in `schema_version`; every migration must be safe to re-run.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** once released
//! 2. **Always add new migrations** for a new schema change
//! 3. **Preserve data**: rebuild tables by copy, never by drop alone

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Latest applied version, 0 for a store that never ran migrations
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("Migration v1 completed");
    }

    Ok(())
}

/// Migration v1: case-insensitive artist cache
///
/// Stores created before the cache was case-insensitive may hold both
/// "queen" and "Queen" and require a non-null `artist_id`. The table is
/// rebuilt with a `COLLATE NOCASE` unique name and a nullable ID, keeping the
/// most recently updated row of every case-insensitive group.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    let table_sql: Option<String> = sqlx::query_scalar(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'artist_cache'",
    )
    .fetch_optional(pool)
    .await?;

    let Some(table_sql) = table_sql else {
        return Ok(());
    };

    if table_sql.to_uppercase().contains("COLLATE NOCASE") {
        return Ok(());
    }

    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE artist_cache_v1 (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_name TEXT NOT NULL UNIQUE COLLATE NOCASE,
            artist_id TEXT,
            romanized_name TEXT,
            romanization_source TEXT,
            romanized_at TIMESTAMP,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(&mut *tx)
    .await?;

    let copied = sqlx::query(
        r#"
        INSERT INTO artist_cache_v1 (
            artist_name, artist_id, romanized_name, romanization_source,
            romanized_at, created_at, updated_at
        )
        SELECT trim(artist_name), artist_id, romanized_name, romanization_source,
               romanized_at, created_at, updated_at
        FROM artist_cache AS a
        WHERE a.id = (
            SELECT b.id FROM artist_cache AS b
            WHERE lower(trim(b.artist_name)) = lower(trim(a.artist_name))
            ORDER BY b.updated_at DESC, b.id DESC
            LIMIT 1
        )
        "#,
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();

    sqlx::query("DROP TABLE artist_cache").execute(&mut *tx).await?;
    sqlx::query("ALTER TABLE artist_cache_v1 RENAME TO artist_cache")
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(rows = copied, "Migration v1: rebuilt artist_cache with case-insensitive names");
    Ok(())
}
