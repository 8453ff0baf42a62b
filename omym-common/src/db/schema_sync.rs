//! Automatic Schema Synchronization
//!
//! Each state table declares the columns the code expects. On connect the
//! declared list is compared with `PRAGMA table_info` and any missing column
//! is added with `ALTER TABLE ADD COLUMN`, so a store written by an older
//! build keeps working without a hand-written migration.
//!
//! Only additions are automatic. Type changes, dropped columns and new
//! constraints are reported and left to [`crate::db::migrations`].

use crate::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Column definition with the subset of SQL constraints ALTER TABLE can add
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    /// Column name
    pub name: String,
    /// SQL type (e.g., "TEXT", "INTEGER", "TIMESTAMP")
    pub sql_type: String,
    /// NOT NULL constraint (only applied when a default exists)
    pub not_null: bool,
    /// DEFAULT expression
    pub default_value: Option<String>,
    /// Part of the primary key; never added after the fact
    pub primary_key: bool,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, sql_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql_type: sql_type.into(),
            not_null: false,
            default_value: None,
            primary_key: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// `ALTER TABLE ... ADD COLUMN` statement for this column
    fn add_column_sql(&self, table: &str) -> String {
        let mut sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            table, self.name, self.sql_type
        );

        match (&self.default_value, self.not_null) {
            (Some(default), true) => sql.push_str(&format!(" NOT NULL DEFAULT {}", default)),
            (Some(default), false) => sql.push_str(&format!(" DEFAULT {}", default)),
            (None, true) => warn!(
                "Cannot add NOT NULL column {}.{} without DEFAULT value; column will be nullable",
                table, self.name
            ),
            (None, false) => {}
        }

        sql
    }
}

/// Declared schema for one table
pub trait TableSchema {
    /// Table name in database
    fn table_name() -> &'static str;

    /// Expected column definitions
    fn expected_columns() -> Vec<ColumnDefinition>;
}

/// Column as reported by `PRAGMA table_info`
#[derive(Debug, Clone)]
pub struct ExistingColumn {
    pub name: String,
    pub type_name: String,
}

/// Schema synchronization entry points
pub struct SchemaSync;

impl SchemaSync {
    /// Add every declared column missing from the table
    ///
    /// Returns the names of the columns that were added.
    pub async fn sync_table<T: TableSchema>(pool: &SqlitePool) -> Result<Vec<String>> {
        let table_name = T::table_name();

        if !Self::table_exists(pool, table_name).await? {
            warn!(
                table = table_name,
                "Table missing during schema sync; it should be created first"
            );
            return Ok(Vec::new());
        }

        let existing = Self::existing_columns(pool, table_name).await?;
        let mut added = Vec::new();

        for column in T::expected_columns() {
            match existing.iter().find(|c| c.name == column.name) {
                Some(actual) if !affinity_matches(&column.sql_type, &actual.type_name) => {
                    warn!(
                        "Type mismatch in {}.{}: expected '{}', found '{}'. Manual migration required.",
                        table_name, column.name, column.sql_type, actual.type_name
                    );
                }
                Some(_) => {}
                None if column.primary_key => {
                    warn!(
                        "Primary key column {}.{} is missing and cannot be added",
                        table_name, column.name
                    );
                }
                None => {
                    Self::add_column(pool, table_name, &column).await?;
                    added.push(column.name);
                }
            }
        }

        if added.is_empty() {
            debug!(table = table_name, "Schema up to date");
        }

        Ok(added)
    }

    /// Read the table's columns in declaration order
    pub async fn existing_columns(pool: &SqlitePool, table_name: &str) -> Result<Vec<ExistingColumn>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", table_name))
            .fetch_all(pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| ExistingColumn {
                name: row.get("name"),
                type_name: row.get("type"),
            })
            .collect())
    }

    pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table_name)
        .fetch_one(pool)
        .await?;

        Ok(exists)
    }

    async fn add_column(pool: &SqlitePool, table: &str, column: &ColumnDefinition) -> Result<()> {
        let sql = column.add_column_sql(table);
        info!("Adding column: {}.{} ({})", table, column.name, column.sql_type);

        match sqlx::query(&sql).execute(pool).await {
            Ok(_) => Ok(()),
            // Another connection got there first
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// SQLite type affinity comparison
fn affinity_matches(expected: &str, actual: &str) -> bool {
    fn affinity(sql_type: &str) -> &'static str {
        let t = sql_type.to_uppercase();
        if t.contains("INT") {
            "INTEGER"
        } else if t.contains("CHAR") || t.contains("CLOB") || t.contains("TEXT") {
            "TEXT"
        } else if t.contains("REAL") || t.contains("FLOA") || t.contains("DOUB") {
            "REAL"
        } else if t.is_empty() || t.contains("BLOB") {
            "BLOB"
        } else {
            "NUMERIC"
        }
    }

    affinity(expected) == affinity(actual)
}
