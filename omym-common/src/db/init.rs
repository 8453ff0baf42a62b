//! Database initialization
//!
//! Opens (or creates) the single SQLite file holding organizer state and
//! brings its schema up to date:
//! 1. `CREATE TABLE IF NOT EXISTS` for every state table
//! 2. Additive column sync ([`sync_all_table_schemas`])
//! 3. Versioned migrations ([`run_migrations`])
//!
//! [`sync_all_table_schemas`]: crate::db::table_schemas::sync_all_table_schemas
//! [`run_migrations`]: crate::db::migrations::run_migrations

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Busy timeout applied to every connection (milliseconds)
pub const BUSY_TIMEOUT_MS: u64 = 5000;

/// Open the state database at `db_path`, creating file and tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                // Per-connection pragmas; a pool-level PRAGMA only reaches one connection
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS))
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the pre-scan read while the batch transaction is open
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    create_state_tables(&pool).await?;

    // Automatically add missing columns to existing tables
    crate::db::table_schemas::sync_all_table_schemas(&pool).await?;

    // Transformations that column sync cannot express
    crate::db::migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Create every state table (idempotent)
pub async fn create_state_tables(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_processing_before_table(pool).await?;
    create_processing_after_table(pool).await?;
    create_artist_cache_table(pool).await?;
    create_processing_preview_table(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Before-state: where a piece of content was first seen
async fn create_processing_before_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_before (
            file_hash TEXT PRIMARY KEY,
            file_path TEXT NOT NULL UNIQUE,
            title TEXT,
            artist TEXT,
            album TEXT,
            album_artist TEXT,
            genre TEXT,
            year INTEGER,
            track_number INTEGER,
            total_tracks INTEGER,
            disc_number INTEGER,
            total_discs INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// After-state: where that content ended up
async fn create_processing_after_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_after (
            file_hash TEXT PRIMARY KEY REFERENCES processing_before(file_hash) ON DELETE CASCADE,
            file_path TEXT NOT NULL UNIQUE,
            target_path TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_processing_after_target ON processing_after(target_path)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Artist cache: short IDs and romanized names keyed by case-insensitive name
async fn create_artist_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artist_cache (
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
    .execute(pool)
    .await?;

    Ok(())
}

/// Preview cache: dry-run decisions waiting for the following real run
async fn create_processing_preview_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS processing_preview (
            file_hash TEXT PRIMARY KEY,
            source_path TEXT NOT NULL,
            base_path TEXT NOT NULL,
            target_path TEXT,
            payload_json TEXT NOT NULL,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_processing_preview_source ON processing_preview(source_path)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
