//! In-memory storage backend.
//!
//! Used for the hot path in single-node deployments and throughout the test
//! suites. Rows are held per (kind, key) in insertion order.

use super::{Record, Storage, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory `Storage` implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<(String, String), Vec<Record>>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Test support: appends a row with an explicit creation time, so epoch
    /// and throttle behaviour can be exercised against back-dated data.
    pub fn insert_at(&self, kind: &str, key: &str, value: Value, created_at: DateTime<Utc>) {
        let mut rows = self.rows.write().expect("store lock poisoned");
        rows.entry((kind.to_string(), key.to_string()))
            .or_default()
            .push(Record { value, created_at });
    }

    /// Test support: replaces all rows for the key with one back-dated row.
    pub fn upsert_at(&self, kind: &str, key: &str, value: Value, created_at: DateTime<Utc>) {
        let mut rows = self.rows.write().expect("store lock poisoned");
        rows.insert(
            (kind.to_string(), key.to_string()),
            vec![Record { value, created_at }],
        );
    }

    /// Number of rows currently stored for a kind, across all keys.
    #[must_use]
    pub fn row_count(&self, kind: &str) -> usize {
        let rows = self.rows.read().expect("store lock poisoned");
        rows.iter().filter(|((k, _), _)| k == kind).map(|(_, v)| v.len()).sum()
    }
}

#[async_trait]
impl Storage for MemoryStore {
    async fn insert(&self, kind: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.insert_at(kind, key, value, Utc::now());
        Ok(())
    }

    async fn upsert(&self, kind: &str, key: &str, value: Value) -> Result<(), StorageError> {
        self.upsert_at(kind, key, value, Utc::now());
        Ok(())
    }

    async fn fetch_latest(&self, kind: &str, key: &str) -> Result<Option<Record>, StorageError> {
        let rows = self.rows.read().expect("store lock poisoned");
        Ok(rows
            .get(&(kind.to_string(), key.to_string()))
            .and_then(|records| records.iter().max_by_key(|r| r.created_at))
            .cloned())
    }

    async fn delete(&self, kind: &str, key: &str) -> Result<u64, StorageError> {
        let mut rows = self.rows.write().expect("store lock poisoned");
        Ok(rows
            .remove(&(kind.to_string(), key.to_string()))
            .map_or(0, |records| records.len() as u64))
    }
}
