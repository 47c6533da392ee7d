//! The insight service pipeline.
//!
//! Wires the core together for one AI-backed operation: model selection →
//! rate-limit gate → cache consult → agent execution (deduplicated by the
//! manager) → telemetry recording → cache insert. The service itself never
//! retries: rate-limit and throttle rejections return immediately with a
//! `retry_after` so the caller can decide.

use crate::insights::{CacheError, InsightCache};
use crate::ratelimit::{RateLimiter, SubscriptionTier};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, warn};
use vantage_abstraction::{Model, ModelError};
use vantage_models::ModelFactory;
use vantage_orchestrator::{
    AgentManager, AgentResponse, ModelRecommendation, ModelSelector, QueueStatus,
    ResponseMetadata, SelectionCriteria, SelectionError, TaskKind, TaskRequest,
};

/// Resolves a model recommendation into a usable model instance.
///
/// The default implementation goes through the model factory (environment
/// API keys); tests inject their own.
pub trait ModelResolver: Send + Sync {
    /// Builds a model for the recommendation.
    ///
    /// # Errors
    /// Returns a `ModelError` when the model cannot be constructed.
    fn resolve(
        &self,
        recommendation: &ModelRecommendation,
    ) -> Result<Arc<dyn Model + Send + Sync>, ModelError>;
}

/// Factory-backed resolver used in production.
#[derive(Debug, Default)]
pub struct FactoryResolver;

impl ModelResolver for FactoryResolver {
    fn resolve(
        &self,
        recommendation: &ModelRecommendation,
    ) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        ModelFactory::create_from_str(&recommendation.provider, recommendation.model.clone())
    }
}

/// One AI-backed operation request.
#[derive(Debug, Clone)]
pub struct InsightRequest {
    /// Requesting user.
    pub user_id: String,
    /// The user's subscription tier.
    pub tier: SubscriptionTier,
    /// Cache subject (e.g., the user's industry).
    pub subject: String,
    /// Cache discriminator (e.g., "market_trends").
    pub insight_type: String,
    /// Which agent serves the task.
    pub kind: TaskKind,
    /// Task description handed to the agent.
    pub task: String,
    /// Structured payload for the agent's tools.
    pub context: Value,
    /// Model selection criteria.
    pub criteria: SelectionCriteria,
    /// Bypass the epoch check (subject to the manual-refresh throttle).
    pub force_refresh: bool,
    /// Optional signal score stored with the cache entry.
    pub signal_score: Option<f64>,
    /// Optional metadata stored with the cache entry.
    pub meta: Option<Value>,
}

/// Service-level errors. Agent failures are not errors here: they come back
/// as `{ success: false }` envelopes.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No model matches the criteria; a configuration error, never retried.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The rate limiter rejected the call.
    #[error("rate limit exceeded for {provider}, retry in {retry_after_secs}s")]
    RateLimited {
        /// Provider the limit applies to.
        provider: String,
        /// Seconds until the window resets.
        retry_after_secs: u64,
        /// Deterministic fallback proposal.
        fallback_provider: Option<String>,
    },

    /// A forced refresh hit the 24-hour throttle.
    #[error("manual refresh throttled, retry in {retry_after_secs}s")]
    RefreshThrottled {
        /// Seconds until the next manual refresh is allowed.
        retry_after_secs: u64,
    },

    /// The cache layer failed.
    #[error("cache error: {0}")]
    Cache(CacheError),

    /// The model could not be constructed.
    #[error("model resolution failed: {0}")]
    Model(#[from] ModelError),
}

/// The orchestration front door for AI-backed product features.
pub struct InsightService {
    selector: ModelSelector,
    limiter: Arc<RateLimiter>,
    cache: Arc<InsightCache>,
    manager: Arc<AgentManager>,
    resolver: Arc<dyn ModelResolver>,
}

impl InsightService {
    /// Creates a service with the factory-backed model resolver.
    #[must_use]
    pub fn new(
        selector: ModelSelector,
        limiter: Arc<RateLimiter>,
        cache: Arc<InsightCache>,
        manager: Arc<AgentManager>,
    ) -> Self {
        Self { selector, limiter, cache, manager, resolver: Arc::new(FactoryResolver) }
    }

    /// Replaces the model resolver (tests inject mock models here).
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn ModelResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Runs one AI-backed operation through the full pipeline.
    ///
    /// # Errors
    /// Returns `ServiceError::Selection` when no model matches (fail fast),
    /// `RateLimited` / `RefreshThrottled` with a `retry_after`, and storage
    /// or model-construction failures. An agent failure is returned as an
    /// `Ok` envelope with `success: false`.
    pub async fn generate_insight(
        &self,
        request: InsightRequest,
    ) -> Result<AgentResponse, ServiceError> {
        let recommendation = self.selector.select_model(&request.criteria)?;
        debug!(
            user_id = %request.user_id,
            provider = %recommendation.provider,
            model = %recommendation.model,
            "Model selected for insight request"
        );

        let decision = self
            .limiter
            .check_rate_limit(
                &request.user_id,
                &recommendation.provider,
                Some(&recommendation.model),
                request.tier,
            )
            .await;
        if !decision.allowed {
            return Err(ServiceError::RateLimited {
                provider: recommendation.provider,
                retry_after_secs: decision.retry_after_secs.unwrap_or(1),
                fallback_provider: decision.fallback_provider,
            });
        }

        let model = self.resolver.resolve(&recommendation)?;

        // The generation closure stashes execution telemetry so it can be
        // recorded even though the cache layer only sees the payload.
        let telemetry: Arc<Mutex<Option<ResponseMetadata>>> = Arc::new(Mutex::new(None));
        let task_request = TaskRequest::new(request.task.clone())
            .with_user_id(request.user_id.clone())
            .with_context(request.context.clone());

        let generate = {
            let manager = Arc::clone(&self.manager);
            let telemetry = Arc::clone(&telemetry);
            let provider = recommendation.provider.clone();
            let cost = recommendation.estimated_cost;
            let kind = request.kind;
            move || async move {
                let response = manager
                    .execute_with_model(kind, task_request, model, provider, cost)
                    .await
                    .map_err(|e| CacheError::Generation(e.to_string()))?;

                *telemetry.lock().expect("telemetry lock poisoned") = response.metadata.clone();

                if !response.success {
                    let message = response
                        .errors
                        .unwrap_or_default()
                        .join("; ");
                    return Err(CacheError::Generation(message));
                }
                Ok(response.data)
            }
        };

        let result: Result<Value, CacheError> = self
            .cache
            .generate_with_cache(
                &request.user_id,
                &request.subject,
                &request.insight_type,
                generate,
                &recommendation.model,
                request.force_refresh,
                request.signal_score,
                request.meta.clone(),
            )
            .await;

        let metadata = telemetry.lock().expect("telemetry lock poisoned").take();

        match result {
            Ok(data) => {
                // A cache hit never invoked the provider, so there is
                // nothing to record.
                if let Some(ref md) = metadata {
                    self.limiter
                        .record_request(
                            &request.user_id,
                            &recommendation.provider,
                            &recommendation.model,
                            md.latency_ms,
                            true,
                            Some(md.tokens_used),
                        )
                        .await;
                }
                let mut response = AgentResponse::succeeded(data);
                response.metadata = metadata;
                Ok(response)
            }
            Err(CacheError::RefreshThrottled { retry_after_secs }) => {
                Err(ServiceError::RefreshThrottled { retry_after_secs })
            }
            Err(CacheError::Generation(message)) => {
                warn!(
                    user_id = %request.user_id,
                    error = %message,
                    "Insight generation failed"
                );
                if let Some(ref md) = metadata {
                    self.limiter
                        .record_request(
                            &request.user_id,
                            &recommendation.provider,
                            &recommendation.model,
                            md.latency_ms,
                            false,
                            Some(md.tokens_used),
                        )
                        .await;
                }
                let mut response = AgentResponse::failed(vec![message]);
                response.metadata = metadata;
                Ok(response)
            }
            Err(other) => Err(ServiceError::Cache(other)),
        }
    }

    /// Liveness of every registered agent.
    pub async fn health_check(&self) -> HashMap<TaskKind, bool> {
        self.manager.health_check().await
    }

    /// Aggregate in-flight status.
    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        self.manager.queue_status()
    }
}

impl std::fmt::Debug for InsightService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightService").finish_non_exhaustive()
    }
}
