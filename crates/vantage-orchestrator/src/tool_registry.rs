//! Tool registry with registration-time contract validation.
//!
//! Contracts are checked when a tool is registered, not only at call time, so
//! schema mistakes surface when an agent is constructed. Arguments are still
//! validated on every invocation; a violation is reported as a tool error,
//! never a silent no-op.

use crate::error::{OrchestratorError, Result};
use crate::tool::{Tool, ToolArguments, ToolResult};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Registry of the tools available to one agent.
///
/// Registration order is preserved; agents invoke tools in the order they
/// were registered when running their default pipeline.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Tool>,
    order: Vec<String>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool, validating its contract.
    ///
    /// # Errors
    /// Returns `OrchestratorError::InvalidToolContract` when the tool name is
    /// empty, the name is already taken, or the parameter schema is
    /// ill-formed.
    pub fn register(&mut self, tool: Tool) -> Result<()> {
        if tool.name.trim().is_empty() {
            return Err(OrchestratorError::InvalidToolContract {
                tool: tool.name,
                reason: "tool name must not be empty".to_string(),
            });
        }
        if self.tools.contains_key(&tool.name) {
            return Err(OrchestratorError::InvalidToolContract {
                tool: tool.name,
                reason: "a tool with this name is already registered".to_string(),
            });
        }
        if let Err(reason) = tool.parameters.check_contract() {
            return Err(OrchestratorError::InvalidToolContract { tool: tool.name, reason });
        }

        debug!(tool = %tool.name, "Registering tool");
        self.order.push(tool.name.clone());
        self.tools.insert(tool.name.clone(), tool);
        Ok(())
    }

    /// Invokes a tool by name with the given arguments.
    ///
    /// Arguments are validated against the tool's declared schema before the
    /// handler runs.
    ///
    /// # Errors
    /// Returns `ToolNotFound` for unknown names, `InvalidToolArguments` for
    /// schema violations, and whatever the handler itself fails with.
    pub async fn invoke(&self, name: &str, args: Value) -> Result<ToolResult> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| OrchestratorError::ToolNotFound(name.to_string()))?;

        if let Err(reason) = tool.parameters.validate_args(&args) {
            warn!(tool = %name, reason = %reason, "Tool arguments rejected");
            return Err(OrchestratorError::InvalidToolArguments {
                tool: name.to_string(),
                reason,
            });
        }

        debug!(tool = %name, "Invoking tool");
        tool.handler.execute(&ToolArguments::new(args)).await
    }

    /// Returns a registered tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.get(name)
    }

    /// Tool names in registration order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
