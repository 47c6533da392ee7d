//! Product core for Vantage.
//!
//! Hosts the services around the agent engine: tiered rate limiting, the
//! epoch-based insight cache, durable storage, configuration, and the
//! `InsightService` pipeline that wires them together.

pub mod config;
pub mod insights;
pub mod logging;
pub mod ratelimit;
pub mod service;
pub mod storage;

pub use config::{ConfigError, CoreConfig};
pub use insights::{
    CacheError, EpochAnchor, EpochTimezone, InsightCache, InsightCacheConfig, InsightEnvelope,
    RefreshLimit,
};
pub use ratelimit::{
    RateLimitDecision, RateLimitStats, RateLimitTables, RateLimiter, SubscriptionTier,
};
pub use service::{FactoryResolver, InsightRequest, InsightService, ModelResolver, ServiceError};
pub use storage::{MemoryStore, Record, SqliteStore, Storage, StorageError};
