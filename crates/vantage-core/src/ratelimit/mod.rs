//! Tiered rate limiting for AI provider calls.

pub mod limiter;
pub mod limits;

pub use limiter::{RateLimitDecision, RateLimitStats, RateLimiter, UsageSnapshot, spawn_sweeper};
pub use limits::{RateLimitTables, SubscriptionTier};
