//! Seen-offer store.
//!
//! SQLite file holding one table of already-notified ids per source, so
//! sources with overlapping id schemes never collide.

use crate::error::ScoutError;
use crate::models::Source;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use std::path::Path;
use tracing::{debug, info};

pub struct SeenStore {
    pool: SqlitePool,
}

impl SeenStore {
    /// Open (creating if needed) the database file at `path`
    pub async fn open(path: &Path) -> Result<Self, ScoutError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ScoutError::Store(sqlx::Error::Io(e)))?;
            }
        }

        let connection_string = format!("sqlite://{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(&connection_string)
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        info!("Seen-offer store ready at {}", path.display());
        Ok(store)
    }

    #[cfg(test)]
    pub async fn in_memory() -> Result<Self, ScoutError> {
        // A single connection, otherwise every pooled connection gets its own database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Create the per-source tables. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<(), ScoutError> {
        for source in Source::ALL {
            let ddl = format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY)",
                source.seen_table()
            );
            sqlx::query(&ddl).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn exists(&self, source: Source, id: &str) -> Result<bool, ScoutError> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?", source.seen_table());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Mark an offer as notified. Recording the same id twice is a no-op.
    pub async fn record(&self, source: Source, id: &str) -> Result<(), ScoutError> {
        let sql = format!("INSERT OR IGNORE INTO {} (id) VALUES (?)", source.seen_table());
        sqlx::query(&sql).bind(id).execute(&self.pool).await?;
        debug!(source = %source, offer_id = id, "Recorded offer as seen");
        Ok(())
    }

    #[cfg(test)]
    pub async fn count(&self, source: Source) -> Result<i64, ScoutError> {
        let sql = format!("SELECT COUNT(*) FROM {}", source.seen_table());
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
