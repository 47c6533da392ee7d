//! Integration tests for the insight cache: epoch validity, the manual
//! refresh throttle, and generator short-circuiting.

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use vantage_core::insights::{CacheError, InsightCache};
use vantage_core::storage::{KIND_INSIGHT_CACHE, KIND_REFRESH_STAMP, MemoryStore};

fn cache_with_store() -> (InsightCache, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    (InsightCache::new(Arc::clone(&store) as _), store)
}

fn counting_generator(
    counter: &Arc<AtomicU32>,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value, CacheError>> + Send>>
{
    let counter = Arc::clone(counter);
    move || {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"insight": "fresh"}))
        })
    }
}

#[tokio::test]
async fn test_second_call_is_served_from_cache() {
    let (cache, _) = cache_with_store();
    let calls = Arc::new(AtomicU32::new(0));

    let first: Value = cache
        .generate_with_cache(
            "user-1",
            "fintech",
            "market_trends",
            counting_generator(&calls),
            "gpt-4o-mini",
            false,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(first["insight"], "fresh");

    let second: Value = cache
        .generate_with_cache(
            "user-1",
            "fintech",
            "market_trends",
            counting_generator(&calls),
            "gpt-4o-mini",
            false,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(second, first);

    // The generation function must not run for the second call.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stale_epoch_entry_is_a_miss() {
    let (cache, store) = cache_with_store();
    let key = InsightCache::entry_key("user-1", "fintech", "market_trends");

    // An entry from a previous epoch: well before any Monday boundary.
    store.insert_at(
        KIND_INSIGHT_CACHE,
        &key,
        json!({
            "payload": {"insight": "ancient"},
            "model_version": "gpt-4o-mini",
            "signal_score": null,
            "meta": null
        }),
        Utc::now() - ChronoDuration::days(8),
    );

    assert!(cache.get_cached_insight("user-1", "fintech", "market_trends").await.unwrap().is_none());

    // A read through the generating path regenerates.
    let calls = Arc::new(AtomicU32::new(0));
    let value: Value = cache
        .generate_with_cache(
            "user-1",
            "fintech",
            "market_trends",
            counting_generator(&calls),
            "gpt-4o-mini",
            false,
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(value["insight"], "fresh");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_fresh_entry_is_served() {
    let (cache, _) = cache_with_store();
    let calls = Arc::new(AtomicU32::new(0));

    let _: Value = cache
        .generate_with_cache(
            "user-1",
            "fintech",
            "summary",
            counting_generator(&calls),
            "gpt-4o-mini",
            false,
            Some(0.7),
            Some(json!({"source": "weekly"})),
        )
        .await
        .unwrap();

    let envelope =
        cache.get_cached_insight("user-1", "fintech", "summary").await.unwrap().unwrap();
    assert_eq!(envelope.payload["insight"], "fresh");
    assert_eq!(envelope.model_version, "gpt-4o-mini");
    assert_eq!(envelope.signal_score, Some(0.7));
}

#[tokio::test]
async fn test_second_forced_refresh_within_a_day_is_throttled() {
    let (cache, _) = cache_with_store();
    let calls = Arc::new(AtomicU32::new(0));

    let _: Value = cache
        .force_refresh_insight(
            "user-1",
            "fintech",
            "market_trends",
            counting_generator(&calls),
            "gpt-4o-mini",
            None,
            None,
        )
        .await
        .unwrap();

    let err = cache
        .force_refresh_insight::<Value, _, _>(
            "user-1",
            "fintech",
            "market_trends",
            counting_generator(&calls),
            "gpt-4o-mini",
            None,
            None,
        )
        .await
        .unwrap_err();

    match err {
        CacheError::RefreshThrottled { retry_after_secs } => assert!(retry_after_secs > 0),
        other => panic!("expected RefreshThrottled, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_throttle_applies_even_when_cache_is_stale() {
    let (cache, store) = cache_with_store();
    let key = InsightCache::entry_key("user-1", "fintech", "market_trends");

    // Weekly cache long expired, but a manual refresh happened an hour ago.
    store.insert_at(
        KIND_INSIGHT_CACHE,
        &key,
        json!({
            "payload": {"insight": "ancient"},
            "model_version": "gpt-4o-mini",
            "signal_score": null,
            "meta": null
        }),
        Utc::now() - ChronoDuration::days(8),
    );
    store.upsert_at(
        KIND_REFRESH_STAMP,
        &key,
        json!({"refreshed_by": "user-1"}),
        Utc::now() - ChronoDuration::hours(1),
    );

    let limit = cache.check_refresh_limit("user-1", "fintech", "market_trends").await.unwrap();
    assert!(!limit.allowed);
    assert!(limit.retry_after_secs.unwrap() > 0);
}

#[tokio::test]
async fn test_throttle_clears_after_a_day() {
    let (cache, store) = cache_with_store();
    let key = InsightCache::entry_key("user-1", "fintech", "market_trends");

    store.upsert_at(
        KIND_REFRESH_STAMP,
        &key,
        json!({"refreshed_by": "user-1"}),
        Utc::now() - ChronoDuration::hours(25),
    );

    let limit = cache.check_refresh_limit("user-1", "fintech", "market_trends").await.unwrap();
    assert!(limit.allowed);
    assert!(limit.last_refresh.is_some());
}

#[tokio::test]
async fn test_forced_refresh_supersedes_entry() {
    let (cache, store) = cache_with_store();

    let _: Value = cache
        .generate_with_cache(
            "user-1",
            "fintech",
            "market_trends",
            || async { Ok(json!({"insight": "v1"})) },
            "gpt-4o-mini",
            false,
            None,
            None,
        )
        .await
        .unwrap();

    let refreshed: Value = cache
        .force_refresh_insight(
            "user-1",
            "fintech",
            "market_trends",
            || async { Ok(json!({"insight": "v2"})) },
            "gpt-4o",
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(refreshed["insight"], "v2");

    // The old entry was deleted before the new row was written.
    assert_eq!(store.row_count(KIND_INSIGHT_CACHE), 1);
    let envelope =
        cache.get_cached_insight("user-1", "fintech", "market_trends").await.unwrap().unwrap();
    assert_eq!(envelope.payload["insight"], "v2");
    assert_eq!(envelope.model_version, "gpt-4o");
}

#[tokio::test]
async fn test_generation_failure_caches_nothing() {
    let (cache, store) = cache_with_store();

    let err = cache
        .generate_with_cache::<Value, _, _>(
            "user-1",
            "fintech",
            "market_trends",
            || async { Err(CacheError::Generation("provider down".to_string())) },
            "gpt-4o-mini",
            false,
            None,
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CacheError::Generation(_)));
    assert_eq!(store.row_count(KIND_INSIGHT_CACHE), 0);
}
