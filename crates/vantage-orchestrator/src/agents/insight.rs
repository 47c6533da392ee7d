//! Schema-validated insight agent.
//!
//! The production shape for assessment, growth-planning, market-intelligence
//! and delegation tasks: run the registered tool pipeline over the request
//! context, compose a generation prompt from the tool outputs, and validate
//! the model's JSON against a declared response schema (with a single
//! automatic repair on mismatch).

use crate::error::{OrchestratorError, Result};
use crate::executor::ExecutionContext;
use crate::memory::{AgentMemory, MemoryTier};
use crate::schema::{self, ResponseSchema};
use crate::tool::Tool;
use crate::tool_registry::ToolRegistry;
use crate::{Agent, AgentResponse, AgentStatus, TaskKind, TaskRequest};
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::debug;
use vantage_abstraction::ModelParameters;

/// Generic tool-pipeline agent producing schema-validated JSON insights.
pub struct InsightAgent {
    kind: TaskKind,
    name: String,
    description: String,
    instructions: String,
    tools: ToolRegistry,
    schema: ResponseSchema,
}

impl InsightAgent {
    /// Creates a new insight agent for the given task kind.
    #[must_use]
    pub fn new(kind: TaskKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            description: description.into(),
            instructions: "You are a business analyst. Use the gathered data to produce \
                           the requested insight."
                .to_string(),
            tools: ToolRegistry::new(),
            schema: ResponseSchema::new(),
        }
    }

    /// Sets the system-style instructions prepended to every prompt.
    #[must_use]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Declares the response schema the model output must satisfy.
    #[must_use]
    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Registers a tool, validating its contract.
    ///
    /// # Errors
    /// Returns `OrchestratorError::InvalidToolContract` on a bad contract.
    pub fn with_tool(mut self, tool: Tool) -> Result<Self> {
        self.tools.register(tool)?;
        Ok(self)
    }

    fn build_prompt(&self, request: &TaskRequest, tool_outputs: &Map<String, Value>) -> String {
        let mut prompt = format!("{}\n\nTask: {}\n", self.instructions, request.task);

        if request.context.is_object() {
            prompt.push_str(&format!("\nContext:\n{}\n", request.context));
        }

        if !tool_outputs.is_empty() {
            prompt.push_str(&format!(
                "\nGathered data:\n{}\n",
                Value::Object(tool_outputs.clone())
            ));
        }

        prompt.push_str(&format!("\nRespond with a {}.", self.schema.describe()));
        prompt
    }
}

#[async_trait]
impl Agent for InsightAgent {
    fn kind(&self) -> TaskKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn preflight(&self, request: &TaskRequest) -> Result<()> {
        if request.task.trim().is_empty() {
            return Err(OrchestratorError::MissingInput("task".to_string()));
        }
        if !self.tools.is_empty() && !request.context.is_object() {
            return Err(OrchestratorError::MissingInput(
                "context object for tool arguments".to_string(),
            ));
        }
        Ok(())
    }

    async fn plan(&self, request: &TaskRequest, memory: &mut AgentMemory) -> Result<Vec<String>> {
        let mut steps: Vec<String> = self
            .tools
            .names()
            .iter()
            .map(|name| format!("Gather data with the {name} tool"))
            .collect();
        steps.push("Compose the generation prompt from gathered data".to_string());
        steps.push("Generate the structured insight with the model".to_string());
        steps.push("Validate the response shape".to_string());

        memory.set("task", json!(request.task), MemoryTier::Long);
        Ok(steps)
    }

    async fn execute(
        &self,
        _plan: &[String],
        request: &TaskRequest,
        context: &ExecutionContext,
        memory: &mut AgentMemory,
    ) -> Result<Value> {
        let args = if request.context.is_object() { request.context.clone() } else { json!({}) };

        let mut tool_outputs = Map::new();
        for name in self.tools.names() {
            let result = self.tools.invoke(name, args.clone()).await?;
            if !result.success {
                return Err(OrchestratorError::ToolExecutionFailed(format!(
                    "{name}: {}",
                    result.output
                )));
            }
            memory.set(name.clone(), result.output.clone(), MemoryTier::Medium);
            tool_outputs.insert(name.clone(), result.output);
        }

        let prompt = self.build_prompt(request, &tool_outputs);
        debug!(agent = %self.name, prompt_len = prompt.len(), "Generating insight");

        let response = context.generate(&prompt, Some(ModelParameters::json())).await?;
        Ok(json!({"raw": response.content}))
    }

    async fn validate(&self, result: Value, context: &ExecutionContext) -> Result<AgentResponse> {
        let raw = result
            .get("raw")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("model produced no output".to_string()))?;

        let value = schema::validate_and_repair(&self.schema, raw, context).await?;
        Ok(AgentResponse::succeeded(value))
    }

    fn status(&self) -> AgentStatus {
        AgentStatus {
            name: self.name.clone(),
            description: self.description.clone(),
            tool_count: self.tools.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{RetryPolicy, TaskExecutor};
    use crate::schema::FieldKind;
    use crate::tool::{ToolArguments, ToolHandler, ToolParameters, ToolResult};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use vantage_abstraction::{
        ChatMessage, Model, ModelError, ModelResponse, ModelUsage,
    };
    use vantage_models::MockModel;

    /// Model that answers from a fixed script, one entry per call.
    struct SequenceModel {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    impl SequenceModel {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: responses.into_iter().map(str::to_string).collect(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Model for SequenceModel {
        async fn generate_text(
            &self,
            _prompt: &str,
            _parameters: Option<ModelParameters>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let content = self
                .responses
                .get(call)
                .cloned()
                .unwrap_or_else(|| self.responses.last().cloned().unwrap_or_default());
            Ok(ModelResponse {
                content,
                model_id: Some("sequence".to_string()),
                usage: Some(ModelUsage {
                    prompt_tokens: 10,
                    completion_tokens: 10,
                    total_tokens: 20,
                }),
            })
        }

        async fn generate_chat_completion(
            &self,
            messages: &[ChatMessage],
            parameters: Option<ModelParameters>,
        ) -> std::result::Result<ModelResponse, ModelError> {
            let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
            self.generate_text(prompt, parameters).await
        }

        fn model_id(&self) -> &str {
            "sequence"
        }
    }

    struct BenchmarkLookup;

    #[async_trait]
    impl ToolHandler for BenchmarkLookup {
        async fn execute(&self, args: &ToolArguments) -> Result<ToolResult> {
            let industry = args.get_string("industry").unwrap_or_default();
            Ok(ToolResult::success(json!({"industry": industry, "median_score": 62})))
        }
    }

    fn agent() -> InsightAgent {
        InsightAgent::new(
            TaskKind::Assessment,
            "assessment-agent",
            "Scores assessments against industry benchmarks",
        )
        .with_schema(
            ResponseSchema::new()
                .field("summary", FieldKind::String, true)
                .field("score", FieldKind::Number, true),
        )
        .with_tool(Tool::new(
            "benchmark_lookup",
            "Looks up industry benchmarks",
            ToolParameters::new().add_property("industry", "string", "Industry name", true),
            Arc::new(BenchmarkLookup),
        ))
        .unwrap()
    }

    fn fast_executor() -> TaskExecutor {
        TaskExecutor::with_retry_policy(RetryPolicy {
            max_attempts: 3,
            backoff_base: Duration::from_millis(1),
        })
    }

    fn request() -> TaskRequest {
        TaskRequest::new("score_assessment")
            .with_user_id("user-1")
            .with_context(json!({"industry": "fintech"}))
    }

    #[tokio::test]
    async fn test_insight_agent_happy_path() {
        let model = MockModel::with_response(
            "mock".to_string(),
            r#"{"summary": "solid fundamentals", "score": 71}"#.to_string(),
        );
        let context = ExecutionContext::new(Arc::new(model)).with_provider("mock");

        let response = fast_executor().process(&agent(), &request(), &context).await;
        assert!(response.success);
        assert_eq!(response.data["score"], 71);
        assert_eq!(response.metadata.unwrap().confidence, 0.9);
    }

    #[tokio::test]
    async fn test_insight_agent_repairs_malformed_output_once() {
        let model = SequenceModel::new(vec![
            "not even json",
            r#"{"summary": "repaired", "score": 55}"#,
        ]);
        let context = ExecutionContext::new(Arc::new(model)).with_provider("mock");

        let response = fast_executor().process(&agent(), &request(), &context).await;
        assert!(response.success);
        assert_eq!(response.data["summary"], "repaired");
        // One generation call plus exactly one repair call.
        assert_eq!(response.metadata.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_insight_agent_fails_after_second_invalid_output() {
        let model = MockModel::with_response("mock".to_string(), "still not json".to_string());
        let context = ExecutionContext::new(Arc::new(model)).with_provider("mock");

        let response = fast_executor().process(&agent(), &request(), &context).await;
        assert!(!response.success);
        assert_eq!(response.metadata.unwrap().attempts, 3);
    }

    #[tokio::test]
    async fn test_insight_agent_requires_context_for_tools() {
        let model = MockModel::new("mock".to_string());
        let context = ExecutionContext::new(Arc::new(model));
        let request = TaskRequest::new("score_assessment");

        let response = fast_executor().process(&agent(), &request, &context).await;
        assert!(!response.success);
        assert_eq!(response.metadata.unwrap().attempts, 0);
    }

    #[tokio::test]
    async fn test_insight_agent_status_reports_tools() {
        let status = agent().status();
        assert_eq!(status.name, "assessment-agent");
        assert_eq!(status.tool_count, 1);
    }
}
