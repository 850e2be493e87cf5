use anyhow::Result;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database lock (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Other` for other database errors.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        // Create the file owner-only before SQLite touches it
        #[cfg(unix)]
        if path != ":memory:" {
            let db_path = std::path::Path::new(path);
            if !db_path.exists() {
                if let Some(parent) = db_path.parent() {
                    if parent.exists() {
                        use std::os::unix::fs::OpenOptionsExt;
                        let _file = std::fs::OpenOptions::new()
                            .write(true)
                            .create_new(true)
                            .mode(0o600)
                            .open(db_path)
                            .ok(); // If creation fails, SQLite will report the error at connect_with.
                    }
                }
            }
        }

        // busy_timeout: wait up to 5s for a lock instead of failing with SQLITE_BUSY.
        // A `serve` loop and a one-shot CLI command may write at the same time.
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .pragma("busy_timeout", "5000")
            .foreign_keys(true);
        // SQLite is single-writer; 5 connections covers the scheduler, a
        // publish trigger and a review command running side by side.
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        let db = Self { pool };
        db.migrate().await.map_err(|e| {
            let error_string = e.to_string().to_lowercase();
            if error_string.contains("database is locked")
                || error_string.contains("database table is locked")
                || error_string.contains("sqlite_busy")
                || error_string.contains("sqlite_locked")
            {
                DatabaseError::InstanceLocked
            } else {
                DatabaseError::Migration(e.to_string())
            }
        })?;
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // Followed accounts. `last_checked_at` NULL means never scanned.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id INTEGER PRIMARY KEY,
                user_id TEXT UNIQUE NOT NULL,
                handle TEXT NOT NULL,
                display_name TEXT,
                last_checked_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Fetched posts, keyed by the platform's identity string
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS content_items (
                id TEXT PRIMARY KEY,
                created_at TEXT,
                text TEXT NOT NULL,
                reply_count INTEGER,
                repost_count INTEGER,
                favorite_count INTEGER,
                quote_count INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS curated_items (
                id INTEGER PRIMARY KEY,
                item_id TEXT UNIQUE NOT NULL REFERENCES content_items(id),
                source_id INTEGER NOT NULL REFERENCES sources(id),
                state INTEGER NOT NULL DEFAULT 0,
                selected_at INTEGER,
                checked_at INTEGER,
                published_at INTEGER
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                id INTEGER PRIMARY KEY,
                author TEXT NOT NULL,
                text TEXT NOT NULL,
                source TEXT,
                last_published_at INTEGER,
                UNIQUE(author, text)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_sources_checked ON sources(last_checked_at)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_curated_state ON curated_items(state, item_id)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_curated_source ON curated_items(source_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_quotes_published ON quotes(last_published_at)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
