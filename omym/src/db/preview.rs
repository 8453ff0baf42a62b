//! Preview cache on SQLite
//!
//! A payload that no longer decodes is logged and treated as absent; the
//! file is then re-extracted instead of failing the batch.

use super::ports::PreviewStore;
use super::{path_from_db, path_to_db};
use crate::models::{PreviewEntry, PreviewPayload};
use async_trait::async_trait;
use omym_common::Result;
use sqlx::SqliteConnection;
use std::path::Path;

type PreviewRow = (String, String, String, Option<String>, String);

fn decode_row(row: PreviewRow) -> Option<PreviewEntry> {
    let (file_hash, source_path, base_path, target_path, payload_json) = row;

    match serde_json::from_str::<PreviewPayload>(&payload_json) {
        Ok(payload) => Some(PreviewEntry {
            file_hash,
            source_path: path_from_db(source_path),
            base_path: path_from_db(base_path),
            target_path: target_path.map(path_from_db),
            payload,
        }),
        Err(e) => {
            tracing::warn!(
                file_hash = %file_hash,
                error = %e,
                "Ignoring undecodable preview payload"
            );
            None
        }
    }
}

#[async_trait]
impl PreviewStore for SqliteConnection {
    async fn preview(&mut self, file_hash: &str) -> Result<Option<PreviewEntry>> {
        let row: Option<PreviewRow> = sqlx::query_as(
            r#"
            SELECT file_hash, source_path, base_path, target_path, payload_json
            FROM processing_preview
            WHERE file_hash = ?
            "#,
        )
        .bind(file_hash)
        .fetch_optional(&mut *self)
        .await?;

        Ok(row.and_then(decode_row))
    }

    async fn preview_for_source(
        &mut self,
        source_path: &Path,
        base_path: &Path,
    ) -> Result<Option<PreviewEntry>> {
        let row: Option<PreviewRow> = sqlx::query_as(
            r#"
            SELECT file_hash, source_path, base_path, target_path, payload_json
            FROM processing_preview
            WHERE source_path = ? AND base_path = ?
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(path_to_db(source_path))
        .bind(path_to_db(base_path))
        .fetch_optional(&mut *self)
        .await?;

        Ok(row.and_then(decode_row))
    }

    async fn upsert_preview(&mut self, entry: &PreviewEntry) -> Result<()> {
        let source = path_to_db(&entry.source_path);
        let base = path_to_db(&entry.base_path);
        let payload_json = serde_json::to_string(&entry.payload)?;

        // The file at this source changed content since the last plan
        sqlx::query(
            "DELETE FROM processing_preview WHERE source_path = ? AND base_path = ? AND file_hash != ?",
        )
        .bind(&source)
        .bind(&base)
        .bind(&entry.file_hash)
        .execute(&mut *self)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO processing_preview (file_hash, source_path, base_path, target_path, payload_json)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(file_hash) DO UPDATE SET
                source_path = excluded.source_path,
                base_path = excluded.base_path,
                target_path = excluded.target_path,
                payload_json = excluded.payload_json,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(&entry.file_hash)
        .bind(&source)
        .bind(&base)
        .bind(entry.target_path.as_deref().map(path_to_db))
        .bind(payload_json)
        .execute(&mut *self)
        .await?;

        Ok(())
    }

    async fn delete_preview(&mut self, file_hash: &str) -> Result<()> {
        sqlx::query("DELETE FROM processing_preview WHERE file_hash = ?")
            .bind(file_hash)
            .execute(&mut *self)
            .await?;

        Ok(())
    }
}
