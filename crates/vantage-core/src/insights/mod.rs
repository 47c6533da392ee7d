//! Insight caching with epoch-based validity and manual-refresh throttling.

pub mod cache;
pub mod epoch;

pub use cache::{CacheError, InsightCache, InsightCacheConfig, InsightEnvelope, RefreshLimit};
pub use epoch::{EpochAnchor, EpochTimezone};
