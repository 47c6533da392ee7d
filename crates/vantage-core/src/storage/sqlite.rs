//! SQLite storage backend.
//!
//! Backs audit logs and cache entries in single-node deployments. The
//! connection is guarded by an async mutex; statements are short and
//! indexed, so holding it across a call is acceptable.

use super::{Record, Storage, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::debug;

/// SQLite-backed `Storage` implementation.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at the given path.
    ///
    /// # Errors
    /// Returns a `StorageError` if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)
            .map_err(|e| StorageError::Backend(format!("failed to open database: {e}")))?;
        Self::migrate(&conn)?;
        debug!(path = %path.display(), "Opened SQLite store");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory database, for tests.
    ///
    /// # Errors
    /// Returns a `StorageError` if the database cannot be created.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Backend(format!("failed to open database: {e}")))?;
        Self::migrate(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn migrate(conn: &Connection) -> Result<(), StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 kind TEXT NOT NULL,
                 key TEXT NOT NULL,
                 value TEXT NOT NULL,
                 created_at TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_records_lookup
                 ON records (kind, key, created_at);",
        )
        .map_err(|e| StorageError::Backend(format!("migration failed: {e}")))
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StorageError::Backend(format!("bad timestamp '{raw}': {e}")))
    }
}

#[async_trait]
impl Storage for SqliteStore {
    async fn insert(&self, kind: &str, key: &str, value: Value) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&value)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO records (kind, key, value, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![kind, key, payload, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StorageError::Backend(format!("insert failed: {e}")))?;
        Ok(())
    }

    async fn upsert(&self, kind: &str, key: &str, value: Value) -> Result<(), StorageError> {
        let payload = serde_json::to_string(&value)?;
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StorageError::Backend(format!("transaction failed: {e}")))?;
        tx.execute(
            "DELETE FROM records WHERE kind = ?1 AND key = ?2",
            params![kind, key],
        )
        .map_err(|e| StorageError::Backend(format!("upsert delete failed: {e}")))?;
        tx.execute(
            "INSERT INTO records (kind, key, value, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![kind, key, payload, Utc::now().to_rfc3339()],
        )
        .map_err(|e| StorageError::Backend(format!("upsert insert failed: {e}")))?;
        tx.commit()
            .map_err(|e| StorageError::Backend(format!("commit failed: {e}")))?;
        Ok(())
    }

    async fn fetch_latest(&self, kind: &str, key: &str) -> Result<Option<Record>, StorageError> {
        let conn = self.conn.lock().await;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT value, created_at FROM records
                 WHERE kind = ?1 AND key = ?2
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                params![kind, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| StorageError::Backend(format!("query failed: {e}")))?;

        match row {
            Some((payload, created_at)) => Ok(Some(Record {
                value: serde_json::from_str(&payload)?,
                created_at: Self::parse_timestamp(&created_at)?,
            })),
            None => Ok(None),
        }
    }

    async fn delete(&self, kind: &str, key: &str) -> Result<u64, StorageError> {
        let conn = self.conn.lock().await;
        let removed = conn
            .execute(
                "DELETE FROM records WHERE kind = ?1 AND key = ?2",
                params![kind, key],
            )
            .map_err(|e| StorageError::Backend(format!("delete failed: {e}")))?;
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert("k", "a", json!({"n": 1})).await.unwrap();

        let record = store.fetch_latest("k", "a").await.unwrap().unwrap();
        assert_eq!(record.value, json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_latest_wins() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert("k", "a", json!(1)).await.unwrap();
        store.insert("k", "a", json!(2)).await.unwrap();

        let record = store.fetch_latest("k", "a").await.unwrap().unwrap();
        assert_eq!(record.value, json!(2));
    }

    #[tokio::test]
    async fn test_upsert_and_delete() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert("k", "a", json!(1)).await.unwrap();
        store.insert("k", "a", json!(2)).await.unwrap();
        store.upsert("k", "a", json!(3)).await.unwrap();

        let record = store.fetch_latest("k", "a").await.unwrap().unwrap();
        assert_eq!(record.value, json!(3));

        assert_eq!(store.delete("k", "a").await.unwrap(), 1);
        assert!(store.fetch_latest("k", "a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vantage.db");
        let store = SqliteStore::open(&path).unwrap();
        store.insert("k", "a", json!("persisted")).await.unwrap();

        drop(store);
        let reopened = SqliteStore::open(&path).unwrap();
        let record = reopened.fetch_latest("k", "a").await.unwrap().unwrap();
        assert_eq!(record.value, json!("persisted"));
    }
}
