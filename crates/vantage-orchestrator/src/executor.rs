//! Task execution engine.
//!
//! Drives an agent through plan → execute → validate with bounded retries and
//! exponential backoff. `process` never lets an error escape: callers always
//! receive a structured `AgentResponse` envelope.

use crate::error::Result;
use crate::memory::{AgentMemory, MemoryTier};
use crate::{Agent, AgentResponse, ResponseMetadata, TaskRequest};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use vantage_abstraction::{Model, ModelError, ModelParameters, ModelResponse};

/// Retry policy for task execution.
///
/// The backoff delay before attempt `n + 1` is `backoff_base × 2^n`, kept
/// bit-exact with the production behaviour; the base is injectable so tests
/// run at microsecond scale.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (default 3).
    pub max_attempts: u32,
    /// Base unit for the exponential backoff delay (default 1 second).
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 3, backoff_base: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Returns the delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Execution context handed to an agent for one `process` call.
///
/// Wraps the selected model, applies the caller-supplied timeout to every
/// model call, and accumulates token usage for response telemetry.
pub struct ExecutionContext {
    model: Arc<dyn Model + Send + Sync>,
    provider: String,
    call_timeout: Option<Duration>,
    cost_per_1m_tokens: f64,
    tokens_used: AtomicU64,
}

impl ExecutionContext {
    /// Creates a context around the given model.
    #[must_use]
    pub fn new(model: Arc<dyn Model + Send + Sync>) -> Self {
        Self {
            model,
            provider: "unknown".to_string(),
            call_timeout: None,
            cost_per_1m_tokens: 0.0,
            tokens_used: AtomicU64::new(0),
        }
    }

    /// Sets the provider label reported in telemetry.
    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    /// Sets the per-call timeout applied to model invocations.
    #[must_use]
    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    /// Sets the cost rate used to estimate spend from token usage.
    #[must_use]
    pub fn with_cost_rate(mut self, cost_per_1m_tokens: f64) -> Self {
        self.cost_per_1m_tokens = cost_per_1m_tokens;
        self
    }

    /// The provider label for this execution.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// The model driving this execution.
    #[must_use]
    pub fn model(&self) -> &Arc<dyn Model + Send + Sync> {
        &self.model
    }

    /// Tokens consumed so far in this execution.
    #[must_use]
    pub fn tokens_used(&self) -> u64 {
        self.tokens_used.load(Ordering::Relaxed)
    }

    /// Estimated spend so far in USD.
    #[must_use]
    pub fn estimated_cost(&self) -> f64 {
        (self.tokens_used() as f64 / 1_000_000.0) * self.cost_per_1m_tokens
    }

    /// Invokes the model, applying the context timeout and recording usage.
    ///
    /// A timeout surfaces as an ordinary provider error and is subject to the
    /// same retry policy as any other failure.
    ///
    /// # Errors
    /// Returns the model's error, or `ModelError::Timeout` on expiry.
    pub async fn generate(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse> {
        let call = self.model.generate_text(prompt, parameters);
        let response = match self.call_timeout {
            Some(limit) => timeout(limit, call).await.map_err(|_| {
                ModelError::Timeout { timeout_ms: limit.as_millis() as u64 }
            })??,
            None => call.await?,
        };

        if let Some(usage) = &response.usage {
            self.tokens_used.fetch_add(u64::from(usage.total_tokens), Ordering::Relaxed);
        }

        Ok(response)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("provider", &self.provider)
            .field("call_timeout", &self.call_timeout)
            .field("tokens_used", &self.tokens_used())
            .finish_non_exhaustive()
    }
}

/// Executor that drives agents to completion.
#[derive(Debug, Clone, Default)]
pub struct TaskExecutor {
    retry: RetryPolicy,
}

impl TaskExecutor {
    /// Creates an executor with the default retry policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an executor with a custom retry policy.
    #[must_use]
    pub fn with_retry_policy(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Runs one request through the agent's state machine.
    ///
    /// Pre-flight failures return immediately without consuming a retry.
    /// Failures in execute or validate are retried up to the retry budget
    /// with exponential backoff; exhaustion converts into a
    /// `{ success: false, errors }` envelope.
    pub async fn process(
        &self,
        agent: &dyn Agent,
        request: &TaskRequest,
        context: &ExecutionContext,
    ) -> AgentResponse {
        let started = Instant::now();

        if let Err(e) = agent.preflight(request) {
            warn!(
                agent = %agent.name(),
                request_id = %request.request_id,
                error = %e,
                "Pre-flight check failed"
            );
            let mut response = AgentResponse::failed(vec![e.to_string()]);
            response.metadata = Some(self.build_metadata(&response, context, started, 0));
            return response;
        }

        let max_attempts = request.max_retries.unwrap_or(self.retry.max_attempts).max(1);
        let mut attempt: u32 = 0;

        loop {
            match self.attempt(agent, request, context).await {
                Ok(mut response) => {
                    attempt += 1;
                    response.metadata =
                        Some(self.build_metadata(&response, context, started, attempt));
                    debug!(
                        agent = %agent.name(),
                        request_id = %request.request_id,
                        attempts = attempt,
                        success = response.success,
                        "Task completed"
                    );
                    return response;
                }
                Err(e) if e.is_fatal() => {
                    warn!(
                        agent = %agent.name(),
                        request_id = %request.request_id,
                        error = %e,
                        "Fatal error, not retrying"
                    );
                    let mut response = AgentResponse::failed(vec![e.to_string()]);
                    response.metadata =
                        Some(self.build_metadata(&response, context, started, attempt));
                    return response;
                }
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_attempts {
                        warn!(
                            agent = %agent.name(),
                            request_id = %request.request_id,
                            attempts = attempt,
                            error = %e,
                            "Retry budget exhausted"
                        );
                        let mut response = AgentResponse::failed(vec![e.to_string()]);
                        response.metadata =
                            Some(self.build_metadata(&response, context, started, attempt));
                        return response;
                    }

                    let delay = self.retry.delay_for(attempt);
                    debug!(
                        agent = %agent.name(),
                        request_id = %request.request_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// One plan → execute → validate pass with fresh working memory.
    async fn attempt(
        &self,
        agent: &dyn Agent,
        request: &TaskRequest,
        context: &ExecutionContext,
    ) -> Result<AgentResponse> {
        let mut memory = AgentMemory::new();

        let plan = agent.plan(request, &mut memory).await?;
        memory.set("plan", json!(plan), MemoryTier::Short);
        debug!(agent = %agent.name(), steps = plan.len(), "Plan recorded");

        let result = agent.execute(&plan, request, context, &mut memory).await?;
        agent.validate(result, context).await
    }

    fn build_metadata(
        &self,
        response: &AgentResponse,
        context: &ExecutionContext,
        started: Instant,
        attempts: u32,
    ) -> ResponseMetadata {
        ResponseMetadata {
            tokens_used: context.tokens_used(),
            cost: context.estimated_cost(),
            latency_ms: started.elapsed().as_millis() as u64,
            provider: context.provider().to_string(),
            confidence: Self::confidence(response),
            attempts,
        }
    }

    /// Confidence score: 0.9 clean success, 0.5 success with non-fatal
    /// errors, 0.0 failure.
    fn confidence(response: &AgentResponse) -> f64 {
        if !response.success {
            return 0.0;
        }
        if response.errors.as_ref().is_some_and(|errors| !errors.is_empty()) {
            return 0.5;
        }
        0.9
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use crate::{AgentStatus, TaskKind};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::AtomicU32;
    use vantage_models::MockModel;

    struct FlakyAgent {
        failures_before_success: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Agent for FlakyAgent {
        fn kind(&self) -> TaskKind {
            TaskKind::Assessment
        }

        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Fails a configured number of times, then succeeds"
        }

        async fn plan(
            &self,
            _request: &TaskRequest,
            _memory: &mut AgentMemory,
        ) -> Result<Vec<String>> {
            Ok(vec!["Try the thing".to_string()])
        }

        async fn execute(
            &self,
            _plan: &[String],
            _request: &TaskRequest,
            _context: &ExecutionContext,
            _memory: &mut AgentMemory,
        ) -> Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(OrchestratorError::ToolExecutionFailed("transient".to_string()))
            } else {
                Ok(json!({"ok": true}))
            }
        }

        async fn validate(
            &self,
            result: Value,
            _context: &ExecutionContext,
        ) -> Result<AgentResponse> {
            Ok(AgentResponse::succeeded(result))
        }

        fn status(&self) -> AgentStatus {
            AgentStatus {
                name: self.name().to_string(),
                description: self.description().to_string(),
                tool_count: 0,
            }
        }
    }

    struct RejectingAgent;

    #[async_trait]
    impl Agent for RejectingAgent {
        fn kind(&self) -> TaskKind {
            TaskKind::Assessment
        }

        fn name(&self) -> &str {
            "rejecting"
        }

        fn description(&self) -> &str {
            "Requires a user id"
        }

        fn preflight(&self, request: &TaskRequest) -> Result<()> {
            if request.user_id.is_none() {
                return Err(OrchestratorError::MissingInput("user_id".to_string()));
            }
            Ok(())
        }

        async fn plan(
            &self,
            _request: &TaskRequest,
            _memory: &mut AgentMemory,
        ) -> Result<Vec<String>> {
            Ok(vec![])
        }

        async fn execute(
            &self,
            _plan: &[String],
            _request: &TaskRequest,
            _context: &ExecutionContext,
            _memory: &mut AgentMemory,
        ) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn validate(
            &self,
            result: Value,
            _context: &ExecutionContext,
        ) -> Result<AgentResponse> {
            Ok(AgentResponse::succeeded(result))
        }
    }

    fn fast_executor() -> TaskExecutor {
        TaskExecutor::with_retry_policy(RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
        })
    }

    fn mock_context() -> ExecutionContext {
        ExecutionContext::new(Arc::new(MockModel::new("mock-model".to_string())))
            .with_provider("mock")
    }

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy { max_attempts: 3, backoff_base: Duration::from_secs(1) };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_always_failing_agent_consumes_exact_retry_budget() {
        let agent = FlakyAgent { failures_before_success: u32::MAX, calls: AtomicU32::new(0) };
        let request = TaskRequest::new("doomed");
        let response = fast_executor().process(&agent, &request, &mock_context()).await;

        assert!(!response.success);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 3);
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.attempts, 3);
        assert_eq!(metadata.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let agent = FlakyAgent { failures_before_success: 2, calls: AtomicU32::new(0) };
        let request = TaskRequest::new("flaky");
        let response = fast_executor().process(&agent, &request, &mock_context()).await;

        assert!(response.success);
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.attempts, 3);
        assert_eq!(metadata.confidence, 0.9);
    }

    #[tokio::test]
    async fn test_preflight_failure_skips_retries() {
        let agent = RejectingAgent;
        let request = TaskRequest::new("no-user");
        let response = fast_executor().process(&agent, &request, &mock_context()).await;

        assert!(!response.success);
        let metadata = response.metadata.unwrap();
        assert_eq!(metadata.attempts, 0);
        assert!(response.errors.unwrap()[0].contains("user_id"));
    }

    #[tokio::test]
    async fn test_request_retry_override_respected() {
        let agent = FlakyAgent { failures_before_success: u32::MAX, calls: AtomicU32::new(0) };
        let request = TaskRequest::new("doomed").with_max_retries(5);
        let response = fast_executor().process(&agent, &request, &mock_context()).await;

        assert!(!response.success);
        assert_eq!(agent.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_context_records_token_usage() {
        let context = mock_context();
        let _ = context.generate("count me", None).await.unwrap();
        assert!(context.tokens_used() > 0);
    }
}
