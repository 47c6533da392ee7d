//! Agent orchestrator for Vantage.
//!
//! This crate defines the agent trait, the plan/execute/validate execution
//! engine, the orchestration manager, and model routing.

pub mod agents;
pub mod error;
pub mod executor;
pub mod manager;
pub mod memory;
pub mod routing;
pub mod schema;
pub mod tool;
pub mod tool_registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

pub use agents::{InsightAgent, PromptAgent};
pub use error::{OrchestratorError, Result};
pub use executor::{ExecutionContext, RetryPolicy, TaskExecutor};
pub use manager::{AgentManager, QueueStatus};
pub use memory::{AgentMemory, MemoryTier};
pub use routing::{
    CapabilityRegistry, Complexity, ModelCapability, ModelRecommendation, ModelSelector,
    SelectionCriteria, SelectionError, SelectionPriority, SelectionTaskType,
};
pub use schema::{FieldKind, ResponseSchema};
pub use tool::{Tool, ToolArguments, ToolHandler, ToolParameters, ToolResult};
pub use tool_registry::ToolRegistry;

/// The kinds of AI-backed tasks the product serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Assessment scoring and insight generation.
    Assessment,
    /// Growth plan construction.
    GrowthPlanning,
    /// Market trend and competitive analysis.
    MarketIntelligence,
    /// Assessment delegation across a team.
    Delegation,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Assessment => "assessment",
            TaskKind::GrowthPlanning => "growth_planning",
            TaskKind::MarketIntelligence => "market_intelligence",
            TaskKind::Delegation => "delegation",
        };
        write!(f, "{name}")
    }
}

/// Priority attached to a task request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Background work.
    Low,
    /// Default interactive priority.
    #[default]
    Medium,
    /// User-facing, latency-sensitive work.
    High,
}

/// Immutable input to the agent execution engine.
///
/// Created by a caller and never mutated by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRequest {
    /// Unique id for this request, used in audit logs.
    pub request_id: String,
    /// Human-readable task description (e.g., "analyze_market").
    pub task: String,
    /// Structured payload the agent's tools consume.
    pub context: Value,
    /// Subject user, when the task is user-scoped.
    pub user_id: Option<String>,
    /// Owning organization, when relevant.
    pub organization_id: Option<String>,
    /// Scheduling priority.
    pub priority: TaskPriority,
    /// Override for the engine's retry budget.
    pub max_retries: Option<u32>,
}

impl TaskRequest {
    /// Creates a new request for the given task.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            task: task.into(),
            context: Value::Null,
            user_id: None,
            organization_id: None,
            priority: TaskPriority::default(),
            max_retries: None,
        }
    }

    /// Sets the structured context payload.
    #[must_use]
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = context;
        self
    }

    /// Sets the subject user id.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the owning organization id.
    #[must_use]
    pub fn with_organization_id(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    /// Sets the scheduling priority.
    #[must_use]
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the engine's retry budget for this request.
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Telemetry attached to an agent response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Total tokens consumed across model calls.
    pub tokens_used: u64,
    /// Estimated cost in USD.
    pub cost: f64,
    /// Wall-clock latency of the whole `process` call, in milliseconds.
    pub latency_ms: u64,
    /// Provider that served the request.
    pub provider: String,
    /// Confidence score: 0.9 clean success, 0.5 success with errors, 0.0 failure.
    pub confidence: f64,
    /// Number of attempts consumed.
    pub attempts: u32,
}

/// The envelope every agent execution resolves to.
///
/// `process` never propagates an error; failures are carried here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResponse {
    /// Whether the execution produced a validated result.
    pub success: bool,
    /// The validated result, or `null` on failure.
    pub data: Value,
    /// Human-readable error list, when any occurred.
    pub errors: Option<Vec<String>>,
    /// Execution telemetry.
    pub metadata: Option<ResponseMetadata>,
}

impl AgentResponse {
    /// Creates a successful response carrying the given data.
    #[must_use]
    pub fn succeeded(data: Value) -> Self {
        Self { success: true, data, errors: None, metadata: None }
    }

    /// Creates a failed response carrying the given errors.
    #[must_use]
    pub fn failed(errors: Vec<String>) -> Self {
        Self { success: false, data: Value::Null, errors: Some(errors), metadata: None }
    }
}

/// Lightweight status probe answer used by health checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentStatus {
    /// The agent's name.
    pub name: String,
    /// The agent's description.
    pub description: String,
    /// Number of registered tools.
    pub tool_count: usize,
}

/// A trait that defines the interface for any task agent.
///
/// The engine drives each request through plan → execute → validate; the plan
/// is recorded in working memory for introspection and does not mechanically
/// drive control flow.
#[async_trait]
pub trait Agent: Send + Sync {
    /// The task kind this agent serves.
    fn kind(&self) -> TaskKind;

    /// Returns the agent's name.
    fn name(&self) -> &str;

    /// Returns a description of the agent's purpose and capabilities.
    fn description(&self) -> &str;

    /// Fail-fast validation of required inputs.
    ///
    /// A failure here does not consume a retry attempt.
    ///
    /// # Errors
    /// Returns `OrchestratorError::MissingInput` when a required input is absent.
    fn preflight(&self, _request: &TaskRequest) -> Result<()> {
        Ok(())
    }

    /// Produces an ordered sequence of human-readable steps.
    ///
    /// # Errors
    /// Returns an `OrchestratorError` if planning fails.
    async fn plan(&self, request: &TaskRequest, memory: &mut AgentMemory) -> Result<Vec<String>>;

    /// Runs the planned work, invoking tools and the model as needed.
    ///
    /// # Errors
    /// Returns an `OrchestratorError` if execution fails; the engine retries.
    async fn execute(
        &self,
        plan: &[String],
        request: &TaskRequest,
        context: &ExecutionContext,
        memory: &mut AgentMemory,
    ) -> Result<Value>;

    /// Structurally validates the accumulated result and builds the response.
    ///
    /// Implementations may attempt exactly one automatic repair by
    /// re-invoking the model before treating the attempt as failed.
    ///
    /// # Errors
    /// Returns an `OrchestratorError` if validation fails; the engine retries.
    async fn validate(&self, result: Value, context: &ExecutionContext) -> Result<AgentResponse>;

    /// Answers the liveness probe used by health checks.
    fn status(&self) -> AgentStatus {
        AgentStatus {
            name: self.name().to_string(),
            description: self.description().to_string(),
            tool_count: 0,
        }
    }
}
