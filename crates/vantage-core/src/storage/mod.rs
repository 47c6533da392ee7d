//! Durable key-value storage behind the core services.
//!
//! The core touches its store through exactly four operations: read latest by
//! key, append-only insert, delete by key, and upsert. Rows are JSON payloads
//! stamped with a creation time. Concurrent readers never observe a
//! half-written row: inserts create new rows, they never mutate in place.

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Record kind for insight cache entries.
pub const KIND_INSIGHT_CACHE: &str = "insight_cache";
/// Record kind for manual-refresh stamps.
pub const KIND_REFRESH_STAMP: &str = "refresh_stamp";
/// Record kind for rate-limit audit rows.
pub const KIND_RATE_LIMIT_AUDIT: &str = "rate_limit_audit";
/// Record kind for the request telemetry log.
pub const KIND_REQUEST_LOG: &str = "request_log";
/// Record kind for admin actions.
pub const KIND_ADMIN_AUDIT: &str = "admin_audit";

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend rejected or failed the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A stored payload could not be (de)serialized.
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A stored row: JSON payload plus creation time.
#[derive(Debug, Clone)]
pub struct Record {
    /// The stored payload.
    pub value: Value,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

/// The durable store interface the core services consume.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Appends a new row for the key. Existing rows are left untouched.
    async fn insert(&self, kind: &str, key: &str, value: Value) -> Result<(), StorageError>;

    /// Replaces all rows for the key with a single new row.
    async fn upsert(&self, kind: &str, key: &str, value: Value) -> Result<(), StorageError>;

    /// Reads the most recently written row for the key, if any.
    async fn fetch_latest(&self, kind: &str, key: &str) -> Result<Option<Record>, StorageError>;

    /// Deletes all rows for the key, returning how many were removed.
    async fn delete(&self, kind: &str, key: &str) -> Result<u64, StorageError>;
}
