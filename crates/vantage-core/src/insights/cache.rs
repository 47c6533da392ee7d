//! Insight cache manager.
//!
//! Stores generated insights keyed by (user, subject, insight-type). An
//! entry is served while it belongs to the current weekly epoch; manually
//! forced refreshes are throttled to one per rolling 24 hours per key,
//! independent of epoch staleness — the throttle protects the generation
//! function from abuse, not data freshness. Refresh always supersedes the
//! entry with a new row; nothing is updated in place, so concurrent readers
//! never observe a half-written entry.

use super::epoch::EpochAnchor;
use crate::storage::{KIND_INSIGHT_CACHE, KIND_REFRESH_STAMP, Storage, StorageError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Insight cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The durable store failed.
    #[error("cache storage error: {0}")]
    Storage(#[from] StorageError),

    /// A manual refresh was requested inside the throttle window.
    #[error("manual refresh throttled, retry in {retry_after_secs}s")]
    RefreshThrottled {
        /// Seconds until the next manual refresh is allowed.
        retry_after_secs: u64,
    },

    /// The generation function failed; nothing was cached.
    #[error("insight generation failed: {0}")]
    Generation(String),

    /// A cached payload could not be (de)serialized.
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What gets stored per cache entry, alongside the row's creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightEnvelope {
    /// The generated insight payload.
    pub payload: Value,
    /// Model version that produced the payload.
    pub model_version: String,
    /// Optional signal score attached by the caller.
    pub signal_score: Option<f64>,
    /// Optional caller metadata.
    pub meta: Option<Value>,
}

/// Result of a refresh-limit check.
#[derive(Debug, Clone)]
pub struct RefreshLimit {
    /// Whether a manual refresh may proceed.
    pub allowed: bool,
    /// Seconds until the next refresh is allowed, when throttled.
    pub retry_after_secs: Option<u64>,
    /// When the last manual refresh happened, if ever.
    pub last_refresh: Option<DateTime<Utc>>,
}

/// Cache configuration.
#[derive(Debug, Clone)]
pub struct InsightCacheConfig {
    /// The weekly epoch boundary.
    pub anchor: EpochAnchor,
    /// Minimum spacing between manual refreshes per key (default 24 hours).
    pub refresh_limit: Duration,
}

impl Default for InsightCacheConfig {
    fn default() -> Self {
        Self { anchor: EpochAnchor::default(), refresh_limit: Duration::from_secs(24 * 60 * 60) }
    }
}

/// Epoch-validated insight cache over a durable store.
pub struct InsightCache {
    storage: Arc<dyn Storage>,
    config: InsightCacheConfig,
}

impl InsightCache {
    /// Creates a cache with default configuration.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_config(storage, InsightCacheConfig::default())
    }

    /// Creates a cache with explicit configuration.
    #[must_use]
    pub fn with_config(storage: Arc<dyn Storage>, config: InsightCacheConfig) -> Self {
        Self { storage, config }
    }

    /// The storage key for one (user, subject, insight-type).
    #[must_use]
    pub fn entry_key(user_id: &str, subject: &str, insight_type: &str) -> String {
        format!("{user_id}:{subject}:{insight_type}")
    }

    /// Reads the cached insight if one exists and is current for this epoch.
    ///
    /// A stale entry is treated as a cache miss even when no newer entry has
    /// been written yet.
    ///
    /// # Errors
    /// Returns a `CacheError` on storage or deserialization failure.
    pub async fn get_cached_insight(
        &self,
        user_id: &str,
        subject: &str,
        insight_type: &str,
    ) -> Result<Option<InsightEnvelope>, CacheError> {
        let key = Self::entry_key(user_id, subject, insight_type);
        let Some(record) = self.storage.fetch_latest(KIND_INSIGHT_CACHE, &key).await? else {
            return Ok(None);
        };

        if !self.config.anchor.is_current(record.created_at, Utc::now()) {
            debug!(key = %key, created_at = %record.created_at, "Cached insight is stale");
            return Ok(None);
        }

        debug!(key = %key, "Serving cached insight");
        Ok(Some(serde_json::from_value(record.value)?))
    }

    /// Checks whether a manual refresh is allowed for the key right now.
    ///
    /// # Errors
    /// Returns a `CacheError` on storage failure.
    pub async fn check_refresh_limit(
        &self,
        user_id: &str,
        subject: &str,
        insight_type: &str,
    ) -> Result<RefreshLimit, CacheError> {
        let key = Self::entry_key(user_id, subject, insight_type);
        let Some(stamp) = self.storage.fetch_latest(KIND_REFRESH_STAMP, &key).await? else {
            return Ok(RefreshLimit { allowed: true, retry_after_secs: None, last_refresh: None });
        };

        let elapsed = Utc::now() - stamp.created_at;
        let limit = chrono::Duration::milliseconds(self.config.refresh_limit.as_millis() as i64);
        if elapsed < limit {
            let retry_after = (limit - elapsed).num_seconds().max(1) as u64;
            return Ok(RefreshLimit {
                allowed: false,
                retry_after_secs: Some(retry_after),
                last_refresh: Some(stamp.created_at),
            });
        }

        Ok(RefreshLimit {
            allowed: true,
            retry_after_secs: None,
            last_refresh: Some(stamp.created_at),
        })
    }

    /// Deletes the cached entry for the key.
    ///
    /// # Errors
    /// Returns a `CacheError` on storage failure.
    pub async fn delete_cached_insight(
        &self,
        user_id: &str,
        subject: &str,
        insight_type: &str,
    ) -> Result<u64, CacheError> {
        let key = Self::entry_key(user_id, subject, insight_type);
        let removed = self.storage.delete(KIND_INSIGHT_CACHE, &key).await?;
        if removed > 0 {
            info!(key = %key, removed, "Deleted cached insight");
        }
        Ok(removed)
    }

    /// Generates an insight with caching.
    ///
    /// Non-forced calls read the cache first and only invoke `generate` on a
    /// miss. Forced calls check the 24-hour throttle, delete the current
    /// entry, regenerate, and stamp the refresh time. Generation failures
    /// propagate without writing anything.
    ///
    /// # Errors
    /// Returns `CacheError::RefreshThrottled` for throttled forced calls,
    /// `CacheError::Generation` when `generate` fails, and storage errors
    /// otherwise.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate_with_cache<T, F, Fut>(
        &self,
        user_id: &str,
        subject: &str,
        insight_type: &str,
        generate: F,
        model_version: &str,
        force_refresh: bool,
        signal_score: Option<f64>,
        meta: Option<Value>,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let key = Self::entry_key(user_id, subject, insight_type);

        if force_refresh {
            let limit = self.check_refresh_limit(user_id, subject, insight_type).await?;
            if !limit.allowed {
                return Err(CacheError::RefreshThrottled {
                    retry_after_secs: limit.retry_after_secs.unwrap_or(1),
                });
            }
            self.delete_cached_insight(user_id, subject, insight_type).await?;
        } else if let Some(envelope) =
            self.get_cached_insight(user_id, subject, insight_type).await?
        {
            return Ok(serde_json::from_value(envelope.payload)?);
        }

        let insight = generate().await?;

        let envelope = InsightEnvelope {
            payload: serde_json::to_value(&insight)?,
            model_version: model_version.to_string(),
            signal_score,
            meta,
        };
        self.storage
            .insert(KIND_INSIGHT_CACHE, &key, serde_json::to_value(&envelope)?)
            .await?;

        if force_refresh {
            self.storage
                .upsert(KIND_REFRESH_STAMP, &key, json!({"refreshed_by": user_id}))
                .await?;
            info!(key = %key, "Force-refreshed insight");
        } else {
            debug!(key = %key, "Cached fresh insight");
        }

        Ok(insight)
    }

    /// Forces a refresh: bypasses the epoch check but honours the throttle.
    ///
    /// # Errors
    /// Same as `generate_with_cache` with `force_refresh` set.
    pub async fn force_refresh_insight<T, F, Fut>(
        &self,
        user_id: &str,
        subject: &str,
        insight_type: &str,
        generate: F,
        model_version: &str,
        signal_score: Option<f64>,
        meta: Option<Value>,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        self.generate_with_cache(
            user_id,
            subject,
            insight_type,
            generate,
            model_version,
            true,
            signal_score,
            meta,
        )
        .await
    }
}

impl std::fmt::Debug for InsightCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightCache").field("config", &self.config).finish_non_exhaustive()
    }
}
