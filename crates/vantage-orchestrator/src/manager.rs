//! Orchestration manager.
//!
//! Fronts the task execution engine: deduplicates concurrent identical
//! requests, runs independent requests in parallel with isolated failure
//! handling, and exposes aggregate health and queue status.

use crate::executor::{ExecutionContext, TaskExecutor};
use crate::{Agent, AgentResponse, AgentStatus, OrchestratorError, TaskKind, TaskRequest};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared, join_all};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use vantage_abstraction::Model;

type SharedExecution = Shared<BoxFuture<'static, AgentResponse>>;

/// An in-flight execution: the shared future plus a generation id so a
/// finished execution never evicts a newer one under the same key.
struct InFlight {
    id: u64,
    future: SharedExecution,
}

/// Aggregate view of in-flight work.
#[derive(Debug, Clone)]
pub struct QueueStatus {
    /// Number of executions currently in flight.
    pub active_executions: usize,
    /// Dedup keys of the in-flight executions.
    pub in_flight: Vec<String>,
}

/// Manager for task agents and their execution.
pub struct AgentManager {
    /// Registry of agents by task kind.
    agents: RwLock<HashMap<TaskKind, Arc<dyn Agent>>>,
    /// Executor driving the plan/execute/validate state machine.
    executor: Arc<TaskExecutor>,
    /// Model used when the caller does not supply one.
    default_model: Arc<dyn Model + Send + Sync>,
    /// Provider label for the default model.
    default_provider: String,
    /// Per-call timeout applied to model invocations.
    call_timeout: Option<Duration>,
    /// In-flight executions keyed by (task kind, subject).
    in_flight: Mutex<HashMap<String, InFlight>>,
    /// Monotonic generation counter for in-flight entries.
    next_execution_id: AtomicU64,
}

impl AgentManager {
    /// Creates a manager with the given default model.
    #[must_use]
    pub fn new(default_model: Arc<dyn Model + Send + Sync>) -> Self {
        Self {
            agents: RwLock::new(HashMap::new()),
            executor: Arc::new(TaskExecutor::new()),
            default_provider: default_model.model_id().to_string(),
            default_model,
            call_timeout: None,
            in_flight: Mutex::new(HashMap::new()),
            next_execution_id: AtomicU64::new(0),
        }
    }

    /// Replaces the executor (e.g., to inject a fast retry policy in tests).
    #[must_use]
    pub fn with_executor(mut self, executor: TaskExecutor) -> Self {
        self.executor = Arc::new(executor);
        self
    }

    /// Sets the per-call model timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = Some(call_timeout);
        self
    }

    /// Sets the provider label reported for default-model executions.
    #[must_use]
    pub fn with_default_provider(mut self, provider: impl Into<String>) -> Self {
        self.default_provider = provider.into();
        self
    }

    /// Registers an agent for its task kind.
    ///
    /// # Returns
    /// `true` if the kind was newly registered, `false` if an agent was replaced.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> bool {
        let kind = agent.kind();
        debug!(kind = %kind, agent = %agent.name(), "Registering agent");

        let mut agents = self.agents.write().await;
        let was_new = !agents.contains_key(&kind);
        agents.insert(kind, agent);

        if !was_new {
            warn!(kind = %kind, "Agent replaced in manager");
        }

        was_new
    }

    /// Whether an agent is registered for the kind.
    pub async fn is_registered(&self, kind: TaskKind) -> bool {
        self.agents.read().await.contains_key(&kind)
    }

    /// Number of registered agents.
    pub async fn agent_count(&self) -> usize {
        self.agents.read().await.len()
    }

    /// Status of every registered agent.
    pub async fn agent_statuses(&self) -> HashMap<TaskKind, AgentStatus> {
        let agents = self.agents.read().await;
        agents.iter().map(|(kind, agent)| (*kind, agent.status())).collect()
    }

    /// The dedup key for a request: task kind plus subject.
    #[must_use]
    pub fn execution_key(kind: TaskKind, request: &TaskRequest) -> String {
        format!("{}:{}", kind, request.user_id.as_deref().unwrap_or("anonymous"))
    }

    /// Executes a request with the manager's default model.
    ///
    /// # Errors
    /// Returns `OrchestratorError::AgentNotFound` when no agent serves the kind.
    pub async fn execute(
        &self,
        kind: TaskKind,
        request: TaskRequest,
    ) -> Result<AgentResponse, OrchestratorError> {
        self.execute_with_model(
            kind,
            request,
            Arc::clone(&self.default_model),
            self.default_provider.clone(),
            0.0,
        )
        .await
    }

    /// Executes a request against a specific model.
    ///
    /// Concurrent requests with the same (kind, subject) attach to the first
    /// in-flight execution instead of starting redundant work; all attached
    /// callers receive the same result.
    ///
    /// # Errors
    /// Returns `OrchestratorError::AgentNotFound` when no agent serves the kind.
    pub async fn execute_with_model(
        &self,
        kind: TaskKind,
        request: TaskRequest,
        model: Arc<dyn Model + Send + Sync>,
        provider: String,
        cost_per_1m_tokens: f64,
    ) -> Result<AgentResponse, OrchestratorError> {
        let agent = {
            let agents = self.agents.read().await;
            agents
                .get(&kind)
                .cloned()
                .ok_or_else(|| OrchestratorError::AgentNotFound(kind.to_string()))?
        };

        let key = Self::execution_key(kind, &request);

        // Attach-or-start must be one atomic read-modify-write so two
        // concurrent callers cannot both believe they are first.
        let (future, execution_id) = {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            if let Some(existing) = in_flight.get(&key) {
                debug!(key = %key, "Attaching to in-flight execution");
                (existing.future.clone(), existing.id)
            } else {
                let id = self.next_execution_id.fetch_add(1, Ordering::SeqCst);
                let executor = Arc::clone(&self.executor);
                let call_timeout = self.call_timeout;
                let future = async move {
                    let mut context = ExecutionContext::new(model)
                        .with_provider(provider)
                        .with_cost_rate(cost_per_1m_tokens);
                    if let Some(limit) = call_timeout {
                        context = context.with_timeout(limit);
                    }
                    executor.process(agent.as_ref(), &request, &context).await
                }
                .boxed()
                .shared();

                debug!(key = %key, execution_id = id, "Starting execution");
                in_flight.insert(key.clone(), InFlight { id, future: future.clone() });
                (future, id)
            }
        };

        let response = future.await;

        // Whichever awaiter finishes first removes the entry; the generation
        // id guards against evicting a newer execution under the same key.
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
            if in_flight.get(&key).is_some_and(|entry| entry.id == execution_id) {
                in_flight.remove(&key);
            }
        }

        Ok(response)
    }

    /// Executes independent requests concurrently.
    ///
    /// Results come back in input order. A failing task never aborts the
    /// others; its slot carries a `{ success: false, errors }` envelope.
    pub async fn execute_parallel(
        &self,
        batch: Vec<(TaskKind, TaskRequest)>,
    ) -> Vec<AgentResponse> {
        let tasks = batch.into_iter().map(|(kind, request)| async move {
            match self.execute(kind, request).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(kind = %kind, error = %e, "Parallel slot failed");
                    AgentResponse::failed(vec![e.to_string()])
                }
            }
        });

        join_all(tasks).await
    }

    /// Advisory cancellation: detaches the key from the in-flight registry so
    /// future identical requests are not deduplicated against it. An
    /// already-started provider call is not interrupted.
    ///
    /// # Returns
    /// `true` if an in-flight entry was removed.
    pub fn cancel_execution(&self, key: &str) -> bool {
        let mut in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        let removed = in_flight.remove(key).is_some();
        if removed {
            debug!(key = %key, "Execution detached from in-flight registry");
        }
        removed
    }

    /// Aggregate queue status.
    pub fn queue_status(&self) -> QueueStatus {
        let in_flight = self.in_flight.lock().expect("in-flight lock poisoned");
        QueueStatus {
            active_executions: in_flight.len(),
            in_flight: in_flight.keys().cloned().collect(),
        }
    }

    /// Liveness check per registered kind: `true` iff the agent answers its
    /// status probe with a non-empty name. This is not a capability or
    /// model-availability check.
    pub async fn health_check(&self) -> HashMap<TaskKind, bool> {
        let agents = self.agents.read().await;
        agents
            .iter()
            .map(|(kind, agent)| (*kind, !agent.status().name.is_empty()))
            .collect()
    }
}

impl std::fmt::Debug for AgentManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentManager")
            .field("default_provider", &self.default_provider)
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::PromptAgent;
    use vantage_models::MockModel;

    fn manager() -> AgentManager {
        AgentManager::new(Arc::new(MockModel::new("mock-model".to_string())))
            .with_default_provider("mock")
    }

    #[tokio::test]
    async fn test_register_and_count() {
        let manager = manager();
        assert_eq!(manager.agent_count().await, 0);

        let was_new = manager
            .register_agent(Arc::new(PromptAgent::new(
                TaskKind::Assessment,
                "assessment-agent",
                "Scores assessments",
            )))
            .await;
        assert!(was_new);
        assert!(manager.is_registered(TaskKind::Assessment).await);
        assert_eq!(manager.agent_count().await, 1);
    }

    #[tokio::test]
    async fn test_register_replacement_reports_false() {
        let manager = manager();
        let agent = || {
            Arc::new(PromptAgent::new(TaskKind::Assessment, "assessment-agent", "v1"))
                as Arc<dyn Agent>
        };
        assert!(manager.register_agent(agent()).await);
        assert!(!manager.register_agent(agent()).await);
        assert_eq!(manager.agent_count().await, 1);
    }

    #[tokio::test]
    async fn test_execute_unknown_kind_fails_fast() {
        let manager = manager();
        let err = manager
            .execute(TaskKind::Delegation, TaskRequest::new("delegate"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn test_health_check_reports_registered_kinds() {
        let manager = manager();
        manager
            .register_agent(Arc::new(PromptAgent::new(
                TaskKind::GrowthPlanning,
                "growth-agent",
                "Builds growth plans",
            )))
            .await;

        let health = manager.health_check().await;
        assert_eq!(health.get(&TaskKind::GrowthPlanning), Some(&true));
        assert!(!health.contains_key(&TaskKind::Assessment));
    }

    #[tokio::test]
    async fn test_queue_status_empty_when_idle() {
        let manager = manager();
        let status = manager.queue_status();
        assert_eq!(status.active_executions, 0);
        assert!(status.in_flight.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_unknown_key() {
        let manager = manager();
        assert!(!manager.cancel_execution("assessment:nobody"));
    }
}
