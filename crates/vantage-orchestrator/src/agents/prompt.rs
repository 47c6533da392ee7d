//! A minimal agent that forwards its task to the model as a plain prompt.

use crate::error::{OrchestratorError, Result};
use crate::executor::ExecutionContext;
use crate::memory::AgentMemory;
use crate::{Agent, AgentResponse, TaskKind, TaskRequest};
use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

/// Agent that sends the task text straight to the model and returns the text
/// response. Useful for free-form generation tasks and as a liveness target.
#[derive(Debug)]
pub struct PromptAgent {
    kind: TaskKind,
    name: String,
    description: String,
}

impl PromptAgent {
    /// Creates a new `PromptAgent` serving the given kind.
    #[must_use]
    pub fn new(kind: TaskKind, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self { kind, name: name.into(), description: description.into() }
    }
}

#[async_trait]
impl Agent for PromptAgent {
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
        Ok(())
    }

    async fn plan(&self, _request: &TaskRequest, _memory: &mut AgentMemory) -> Result<Vec<String>> {
        Ok(vec!["Send the task prompt to the model".to_string()])
    }

    async fn execute(
        &self,
        _plan: &[String],
        request: &TaskRequest,
        context: &ExecutionContext,
        _memory: &mut AgentMemory,
    ) -> Result<Value> {
        debug!(agent = %self.name, request_id = %request.request_id, "PromptAgent executing");
        let response = context.generate(&request.task, None).await?;
        Ok(json!({"raw": response.content}))
    }

    async fn validate(&self, result: Value, _context: &ExecutionContext) -> Result<AgentResponse> {
        let text = result
            .get("raw")
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::Validation("model produced no text".to_string()))?;
        Ok(AgentResponse::succeeded(json!({"text": text})))
    }
}
