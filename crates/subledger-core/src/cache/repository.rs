//! Durable message cache storage.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use subledger_gmail::Message;
use tracing::warn;

use super::model::CacheEntry;
use crate::Result;

/// SQLite bind-parameter budget per `IN (...)` lookup.
const LOOKUP_CHUNK: usize = 500;

/// Repository for durable message cache storage and retrieval.
#[derive(Debug, Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Create a new store with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Opens the store at `path`, starting cold if the file is unusable.
    ///
    /// A database that fails to open is deleted and recreated; if that also
    /// fails the cache runs from an in-memory database for this process.
    ///
    /// # Errors
    ///
    /// Returns an error only if even the in-memory fallback cannot be created.
    pub async fn open_or_recreate(path: &Path) -> Result<Self> {
        let path_str = path.to_string_lossy();
        match Self::new(&path_str).await {
            Ok(store) => return Ok(store),
            Err(e) => warn!("Message cache at {} unusable ({}), recreating", path_str, e),
        }

        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove message cache {}: {}", path_str, e);
        }
        match Self::new(&path_str).await {
            Ok(store) => Ok(store),
            Err(e) => {
                warn!("Falling back to in-memory message cache: {}", e);
                Self::in_memory().await
            }
        }
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS cached_messages (
                id TEXT PRIMARY KEY,
                thread_id TEXT NOT NULL DEFAULT '',
                snippet TEXT NOT NULL DEFAULT '',
                subject TEXT NOT NULL DEFAULT '',
                sender TEXT NOT NULL DEFAULT '',
                internal_date INTEGER NOT NULL DEFAULT 0,
                has_unsubscribe_header INTEGER NOT NULL DEFAULT 0,
                cached_at INTEGER NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        // Index for age-based pruning
        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_cached_messages_cached_at
            ON cached_messages(cached_at)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Cache multiple entries in one transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn put_many(&self, entries: &[CacheEntry]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for entry in entries {
            let message = &entry.message;
            sqlx::query(
                r"
                INSERT INTO cached_messages
                    (id, thread_id, snippet, subject, sender, internal_date,
                     has_unsubscribe_header, cached_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    thread_id = excluded.thread_id,
                    snippet = excluded.snippet,
                    subject = excluded.subject,
                    sender = excluded.sender,
                    internal_date = excluded.internal_date,
                    has_unsubscribe_header = excluded.has_unsubscribe_header,
                    cached_at = excluded.cached_at
                ",
            )
            .bind(&message.id)
            .bind(&message.thread_id)
            .bind(&message.snippet)
            .bind(&message.subject)
            .bind(&message.from)
            .bind(message.internal_date)
            .bind(message.has_unsubscribe_header)
            .bind(entry.cached_at.timestamp_millis())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Get a cached entry by message id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get(&self, id: &str) -> Result<Option<CacheEntry>> {
        let row = sqlx::query(
            r"
            SELECT id, thread_id, snippet, subject, sender, internal_date,
                   has_unsubscribe_header, cached_at
            FROM cached_messages
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().and_then(row_to_entry))
    }

    /// Get all cached entries among `ids`. Unknown ids are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn get_many(&self, ids: &[String]) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "SELECT id, thread_id, snippet, subject, sender, internal_date, \
                 has_unsubscribe_header, cached_at FROM cached_messages WHERE id IN (",
            );
            let mut separated = builder.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");

            let rows = builder.build().fetch_all(&self.pool).await?;
            entries.extend(rows.iter().filter_map(row_to_entry));
        }
        Ok(entries)
    }

    /// Get every cached entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn all(&self) -> Result<Vec<CacheEntry>> {
        let rows = sqlx::query(
            r"
            SELECT id, thread_id, snippet, subject, sender, internal_date,
                   has_unsubscribe_header, cached_at
            FROM cached_messages
            ORDER BY internal_date ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().filter_map(row_to_entry).collect())
    }

    /// Delete entries cached before `cutoff`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(r"DELETE FROM cached_messages WHERE cached_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Delete every entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn clear(&self) -> Result<()> {
        sqlx::query(r"DELETE FROM cached_messages")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Number of cached entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn count(&self) -> Result<u64> {
        let row = sqlx::query(r"SELECT COUNT(*) as count FROM cached_messages")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

/// Decodes a row; rows that fail to decode are treated as absent.
fn row_to_entry(row: &SqliteRow) -> Option<CacheEntry> {
    let cached_at_ms: i64 = row.try_get("cached_at").ok()?;
    let cached_at = Utc.timestamp_millis_opt(cached_at_ms).single()?;

    Some(CacheEntry {
        message: Message {
            id: row.try_get("id").ok()?,
            thread_id: row.try_get("thread_id").ok()?,
            snippet: row.try_get("snippet").ok()?,
            subject: row.try_get("subject").ok()?,
            from: row.try_get("sender").ok()?,
            internal_date: row.try_get("internal_date").ok()?,
            has_unsubscribe_header: row.try_get("has_unsubscribe_header").ok()?,
        },
        cached_at,
    })
}
