//! Sliding-window rate limiter.
//!
//! Tracks per-user, per-provider, per-model request counts in fixed windows
//! and enforces the tightest of the tier, provider, and model ceilings.
//! Admission and increment happen in one critical section; a fully elapsed
//! window counts as zero before evaluation (lazy reset, not eager).

use super::limits::{RateLimitTables, SubscriptionTier};
use crate::storage::{KIND_ADMIN_AUDIT, KIND_RATE_LIMIT_AUDIT, KIND_REQUEST_LOG, Storage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window.
    pub remaining: u32,
    /// When the current window resets.
    pub reset_time: DateTime<Utc>,
    /// Provider the check was made against.
    pub provider: String,
    /// Model the check was made against, if any.
    pub model: Option<String>,
    /// Proposed fallback provider when rejected.
    pub fallback_provider: Option<String>,
    /// Seconds until retry makes sense, when rejected.
    pub retry_after_secs: Option<u64>,
}

/// Aggregate per-provider statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitStats {
    /// Provider the stats are for.
    pub provider: String,
    /// Recorded requests.
    pub total_requests: u64,
    /// Checks rejected by the limiter.
    pub blocked_requests: u64,
    /// Rejections for which a fallback provider was proposed.
    pub fallback_suggested: u64,
    /// Running mean of recorded response times.
    pub average_response_time_ms: f64,
    /// Failed requests over recorded requests.
    pub error_rate: f64,
    /// When the stats were last reset.
    pub last_reset: DateTime<Utc>,
}

impl RateLimitStats {
    fn new(provider: &str) -> Self {
        Self {
            provider: provider.to_string(),
            total_requests: 0,
            blocked_requests: 0,
            fallback_suggested: 0,
            average_response_time_ms: 0.0,
            error_rate: 0.0,
            last_reset: Utc::now(),
        }
    }
}

/// Current usage for one subject key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Requests counted in the current window.
    pub count: u32,
    /// When the window resets.
    pub reset_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u32,
    window_start: DateTime<Utc>,
}

struct StatsInner {
    per_provider: HashMap<String, RateLimitStats>,
    failed_requests: HashMap<String, u64>,
}

/// Sliding-window rate limiter with durable audit mirroring.
pub struct RateLimiter {
    tables: RateLimitTables,
    counters: Mutex<HashMap<String, WindowCounter>>,
    stats: Mutex<StatsInner>,
    storage: Arc<dyn Storage>,
}

impl RateLimiter {
    /// Creates a limiter over the default tables.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self::with_tables(RateLimitTables::default(), storage)
    }

    /// Creates a limiter over custom tables.
    #[must_use]
    pub fn with_tables(tables: RateLimitTables, storage: Arc<dyn Storage>) -> Self {
        Self {
            tables,
            counters: Mutex::new(HashMap::new()),
            stats: Mutex::new(StatsInner {
                per_provider: HashMap::new(),
                failed_requests: HashMap::new(),
            }),
            storage,
        }
    }

    /// The configured tables.
    #[must_use]
    pub fn tables(&self) -> &RateLimitTables {
        &self.tables
    }

    fn subject_key(user_id: &str, provider: &str, model: Option<&str>) -> String {
        match model {
            Some(model) => format!("{user_id}:{provider}:{model}"),
            None => format!("{user_id}:{provider}"),
        }
    }

    fn window_duration(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.tables.window.as_millis() as i64)
    }

    /// Checks whether a request may proceed, incrementing the counter when it
    /// may. The check and the increment are one read-modify-write under the
    /// counter lock, so two concurrent callers can never both take the last
    /// slot.
    pub async fn check_rate_limit(
        &self,
        user_id: &str,
        provider: &str,
        model: Option<&str>,
        tier: SubscriptionTier,
    ) -> RateLimitDecision {
        let now = Utc::now();
        let key = Self::subject_key(user_id, provider, model);
        // Limits are recomputed from the tables on every check.
        let limit = self.tables.effective_limit(tier, provider, model);
        let window = self.window_duration();

        let decision = {
            let mut counters = self.counters.lock().expect("counter lock poisoned");
            let counter = counters
                .entry(key.clone())
                .or_insert(WindowCounter { count: 0, window_start: now });

            // Lazy reset: an elapsed window counts as zero before evaluation.
            if now - counter.window_start >= window {
                counter.count = 0;
                counter.window_start = now;
            }

            let reset_time = counter.window_start + window;
            if counter.count < limit {
                counter.count += 1;
                RateLimitDecision {
                    allowed: true,
                    remaining: limit - counter.count,
                    reset_time,
                    provider: provider.to_string(),
                    model: model.map(str::to_string),
                    fallback_provider: None,
                    retry_after_secs: None,
                }
            } else {
                let retry_after = (reset_time - now).num_seconds().max(1) as u64;
                RateLimitDecision {
                    allowed: false,
                    remaining: 0,
                    reset_time,
                    provider: provider.to_string(),
                    model: model.map(str::to_string),
                    fallback_provider: self
                        .tables
                        .fallback_provider(provider)
                        .map(str::to_string),
                    retry_after_secs: Some(retry_after),
                }
            }
        };

        if decision.allowed {
            debug!(key = %key, remaining = decision.remaining, "Rate limit check passed");
        } else {
            warn!(
                key = %key,
                limit,
                retry_after = ?decision.retry_after_secs,
                fallback = ?decision.fallback_provider,
                "Rate limit exceeded"
            );
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            let entry = stats
                .per_provider
                .entry(provider.to_string())
                .or_insert_with(|| RateLimitStats::new(provider));
            entry.blocked_requests += 1;
            if decision.fallback_provider.is_some() {
                entry.fallback_suggested += 1;
            }
        }

        // Audit mirror is best-effort: a storage failure never blocks the
        // hot path.
        if let Err(e) = self
            .storage
            .upsert(
                KIND_RATE_LIMIT_AUDIT,
                &key,
                json!({
                    "user_id": user_id,
                    "provider": provider,
                    "model": model,
                    "allowed": decision.allowed,
                    "remaining": decision.remaining,
                    "checked_at": now.to_rfc3339(),
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to mirror rate-limit check to storage");
        }

        decision
    }

    /// Records the outcome of a completed provider request.
    pub async fn record_request(
        &self,
        user_id: &str,
        provider: &str,
        model: &str,
        response_time_ms: u64,
        success: bool,
        tokens_used: Option<u64>,
    ) {
        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            let failed = stats.failed_requests.entry(provider.to_string()).or_insert(0);
            if !success {
                *failed += 1;
            }
            let failed = *failed;

            let entry = stats
                .per_provider
                .entry(provider.to_string())
                .or_insert_with(|| RateLimitStats::new(provider));
            entry.total_requests += 1;
            entry.average_response_time_ms = (entry.average_response_time_ms
                * (entry.total_requests - 1) as f64
                + response_time_ms as f64)
                / entry.total_requests as f64;
            entry.error_rate = failed as f64 / entry.total_requests as f64;
        }

        if let Err(e) = self
            .storage
            .insert(
                KIND_REQUEST_LOG,
                &Self::subject_key(user_id, provider, Some(model)),
                json!({
                    "user_id": user_id,
                    "provider": provider,
                    "model": model,
                    "response_time_ms": response_time_ms,
                    "success": success,
                    "tokens_used": tokens_used,
                    "recorded_at": Utc::now().to_rfc3339(),
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to log request telemetry");
        }
    }

    /// Administrative override: clears in-memory counters for a user without
    /// touching the durable audit log. The reset itself is audited.
    pub async fn reset_user_limits(&self, user_id: &str, provider: Option<&str>) {
        let prefix = match provider {
            Some(provider) => format!("{user_id}:{provider}"),
            None => format!("{user_id}:"),
        };

        let removed = {
            let mut counters = self.counters.lock().expect("counter lock poisoned");
            let before = counters.len();
            counters.retain(|key, _| !key.starts_with(&prefix));
            before - counters.len()
        };

        info!(user_id = %user_id, provider = ?provider, removed, "Rate limits reset by admin");

        if let Err(e) = self
            .storage
            .insert(
                KIND_ADMIN_AUDIT,
                user_id,
                json!({
                    "action": "reset_rate_limits",
                    "user_id": user_id,
                    "provider": provider,
                    "removed_windows": removed,
                    "at": Utc::now().to_rfc3339(),
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to audit admin reset");
        }
    }

    /// Current per-subject usage for a user.
    #[must_use]
    pub fn user_usage(&self, user_id: &str) -> HashMap<String, UsageSnapshot> {
        let prefix = format!("{user_id}:");
        let window = self.window_duration();
        let counters = self.counters.lock().expect("counter lock poisoned");
        counters
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(key, counter)| {
                (
                    key[prefix.len()..].to_string(),
                    UsageSnapshot {
                        count: counter.count,
                        reset_time: counter.window_start + window,
                    },
                )
            })
            .collect()
    }

    /// Per-provider statistics; all providers when none is given.
    #[must_use]
    pub fn stats(&self, provider: Option<&str>) -> Vec<RateLimitStats> {
        let stats = self.stats.lock().expect("stats lock poisoned");
        match provider {
            Some(provider) => {
                stats.per_provider.get(provider).cloned().into_iter().collect()
            }
            None => stats.per_provider.values().cloned().collect(),
        }
    }

    /// Evicts windows that have fully elapsed, returning how many were
    /// removed. Bounds memory between sweeps.
    pub fn evict_expired(&self) -> usize {
        let now = Utc::now();
        let window = self.window_duration();
        let mut counters = self.counters.lock().expect("counter lock poisoned");
        let before = counters.len();
        counters.retain(|_, counter| now - counter.window_start < window);
        let removed = before - counters.len();
        if removed > 0 {
            debug!(removed, "Evicted expired rate-limit windows");
        }
        removed
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("window", &self.tables.window)
            .finish_non_exhaustive()
    }
}

/// Spawns the background sweep that evicts expired windows on an interval.
pub fn spawn_sweeper(limiter: Arc<RateLimiter>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            limiter.evict_expired();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn limiter() -> RateLimiter {
        RateLimiter::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_rejects() {
        let limiter = limiter();

        for i in 0..10 {
            let decision = limiter
                .check_rate_limit("user-1", "openai", None, SubscriptionTier::Free)
                .await;
            assert!(decision.allowed, "request {} should pass", i + 1);
            assert_eq!(decision.remaining, 9 - i);
        }

        let decision = limiter
            .check_rate_limit("user-1", "openai", None, SubscriptionTier::Free)
            .await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after_secs.unwrap() > 0);
        assert_eq!(decision.fallback_provider.as_deref(), Some("anthropic"));
    }

    #[tokio::test]
    async fn test_model_ceiling_applies() {
        let limiter = limiter();

        // Premium tier is 60/min, openai 100/min, but gpt-4o caps at 20/min.
        for _ in 0..20 {
            let decision = limiter
                .check_rate_limit("user-1", "openai", Some("gpt-4o"), SubscriptionTier::Premium)
                .await;
            assert!(decision.allowed);
        }
        let decision = limiter
            .check_rate_limit("user-1", "openai", Some("gpt-4o"), SubscriptionTier::Premium)
            .await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn test_subjects_are_independent() {
        let limiter = limiter();

        for _ in 0..10 {
            limiter.check_rate_limit("user-1", "openai", None, SubscriptionTier::Free).await;
        }
        let other_user = limiter
            .check_rate_limit("user-2", "openai", None, SubscriptionTier::Free)
            .await;
        assert!(other_user.allowed);

        let other_provider = limiter
            .check_rate_limit("user-1", "anthropic", None, SubscriptionTier::Free)
            .await;
        assert!(other_provider.allowed);
    }

    #[tokio::test]
    async fn test_lazy_window_reset() {
        let tables =
            RateLimitTables::default().with_window(Duration::from_millis(50));
        let limiter = RateLimiter::with_tables(tables, Arc::new(MemoryStore::new()));

        for _ in 0..10 {
            limiter.check_rate_limit("user-1", "openai", None, SubscriptionTier::Free).await;
        }
        assert!(
            !limiter
                .check_rate_limit("user-1", "openai", None, SubscriptionTier::Free)
                .await
                .allowed
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        let decision = limiter
            .check_rate_limit("user-1", "openai", None, SubscriptionTier::Free)
            .await;
        assert!(decision.allowed, "elapsed window must count as zero");
        assert_eq!(decision.remaining, 9);
    }

    #[tokio::test]
    async fn test_admin_reset_clears_counters_and_audits() {
        let store = Arc::new(MemoryStore::new());
        let limiter = RateLimiter::new(Arc::clone(&store) as Arc<dyn Storage>);

        for _ in 0..10 {
            limiter.check_rate_limit("user-1", "openai", None, SubscriptionTier::Free).await;
        }
        limiter.reset_user_limits("user-1", None).await;

        let decision = limiter
            .check_rate_limit("user-1", "openai", None, SubscriptionTier::Free)
            .await;
        assert!(decision.allowed);
        assert_eq!(store.row_count(KIND_ADMIN_AUDIT), 1);
    }

    #[tokio::test]
    async fn test_user_usage_reports_current_counts() {
        let limiter = limiter();
        limiter.check_rate_limit("user-1", "openai", None, SubscriptionTier::Free).await;
        limiter.check_rate_limit("user-1", "openai", None, SubscriptionTier::Free).await;
        limiter
            .check_rate_limit("user-1", "vertex", Some("gemini-1.5-flash"), SubscriptionTier::Free)
            .await;

        let usage = limiter.user_usage("user-1");
        assert_eq!(usage.get("openai").unwrap().count, 2);
        assert_eq!(usage.get("vertex:gemini-1.5-flash").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_stats_track_blocks_and_telemetry() {
        let limiter = limiter();
        for _ in 0..11 {
            limiter.check_rate_limit("user-1", "openai", None, SubscriptionTier::Free).await;
        }
        limiter.record_request("user-1", "openai", "gpt-4o-mini", 200, true, Some(150)).await;
        limiter.record_request("user-1", "openai", "gpt-4o-mini", 400, false, None).await;

        let stats = limiter.stats(Some("openai")).pop().unwrap();
        assert_eq!(stats.blocked_requests, 1);
        assert_eq!(stats.fallback_suggested, 1);
        assert_eq!(stats.total_requests, 2);
        assert!((stats.average_response_time_ms - 300.0).abs() < f64::EPSILON);
        assert!((stats.error_rate - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_evict_expired_windows() {
        let tables =
            RateLimitTables::default().with_window(Duration::from_millis(10));
        let limiter = RateLimiter::with_tables(tables, Arc::new(MemoryStore::new()));

        limiter.check_rate_limit("user-1", "openai", None, SubscriptionTier::Free).await;
        limiter.check_rate_limit("user-2", "vertex", None, SubscriptionTier::Free).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(limiter.evict_expired(), 2);
        assert!(limiter.user_usage("user-1").is_empty());
    }
}
