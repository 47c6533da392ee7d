// Error types for orchestration

use thiserror::Error;
use vantage_abstraction::ModelError;

/// Result type for orchestration operations
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// A required input was missing from the request (pre-flight failure).
    #[error("Missing required input: {0}")]
    MissingInput(String),

    /// No agent is registered for the requested task kind.
    #[error("No agent registered for task kind '{0}'")]
    AgentNotFound(String),

    /// Tool registration contract violation.
    #[error("Invalid tool contract for '{tool}': {reason}")]
    InvalidToolContract {
        /// Tool name
        tool: String,
        /// Reason why the contract is invalid
        reason: String,
    },

    /// Invalid tool arguments
    #[error("Invalid tool arguments for '{tool}': {reason}")]
    InvalidToolArguments {
        /// Tool name
        tool: String,
        /// Reason why arguments are invalid
        reason: String,
    },

    /// The named tool is not registered.
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool execution failed
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    /// Model error
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Result failed structural validation after the repair attempt.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Execution cancelled
    #[error("Execution cancelled")]
    Cancelled,

    /// Other error
    #[error("Orchestration error: {0}")]
    Other(String),
}

impl OrchestratorError {
    /// Whether this error is a configuration problem that must fail fast
    /// instead of consuming retry attempts.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MissingInput(_) | Self::AgentNotFound(_) | Self::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(OrchestratorError::MissingInput("user_id".to_string()).is_fatal());
        assert!(OrchestratorError::AgentNotFound("assessment".to_string()).is_fatal());
        assert!(!OrchestratorError::ToolExecutionFailed("boom".to_string()).is_fatal());
        assert!(!OrchestratorError::Validation("bad shape".to_string()).is_fatal());
    }
}
