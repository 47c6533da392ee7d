//! Model implementations for Vantage.
//!
//! This crate provides concrete implementations of the `Model` trait.
//!
//! # Supported Providers
//!
//! - **Mock**: Testing and development
//! - **OpenAI / Anthropic / Vertex / Mistral**: Hosted providers, all reached
//!   through the OpenAI-compatible gateway adapter (API key required)

pub mod factory;
pub mod gateway;

use async_trait::async_trait;
use tracing::debug;
use vantage_abstraction::{
    ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage, ResponseFormat,
};

pub use factory::{ModelConfig, ModelFactory, ModelType};
pub use gateway::GatewayModel;

/// A mock implementation of the `Model` trait for testing and demonstration.
///
/// By default it echoes the prompt back. A scripted response can be set so
/// schema-validation paths can be exercised deterministically.
#[derive(Debug, Default)]
pub struct MockModel {
    id: String,
    scripted: Option<String>,
}

impl MockModel {
    /// Creates a new `MockModel` with the given ID.
    #[must_use]
    pub const fn new(id: String) -> Self {
        Self { id, scripted: None }
    }

    /// Creates a `MockModel` that always answers with the given content.
    #[must_use]
    pub fn with_response(id: String, content: String) -> Self {
        Self { id, scripted: Some(content) }
    }

    fn respond(&self, prompt: &str, parameters: Option<&ModelParameters>) -> ModelResponse {
        let content = self.scripted.clone().unwrap_or_else(|| {
            if parameters.and_then(|p| p.response_format) == Some(ResponseFormat::Json) {
                format!("{{\"echo\": {}}}", serde_json::json!(prompt))
            } else {
                format!("Mock response for: {prompt}\nModel ID: {}", self.id)
            }
        });

        let prompt_tokens = count_tokens(prompt);
        let completion_tokens = count_tokens(&content);
        let total_tokens = prompt_tokens + completion_tokens;

        ModelResponse {
            content,
            model_id: Some(self.id.clone()),
            usage: Some(ModelUsage { prompt_tokens, completion_tokens, total_tokens }),
        }
    }
}

#[async_trait]
impl Model for MockModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            prompt_len = prompt.len(),
            parameters = ?parameters,
            "MockModel generating text"
        );

        Ok(self.respond(prompt, parameters.as_ref()))
    }

    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.id,
            message_count = messages.len(),
            "MockModel generating chat completion"
        );

        let prompt = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(self.respond(prompt, parameters.as_ref()))
    }

    fn model_id(&self) -> &str {
        &self.id
    }
}

/// Rough token estimate: one token per 4 bytes of content.
///
/// Good enough for mock usage statistics and budget estimates; real token
/// counts come back from providers.
#[must_use]
pub fn count_tokens(text: &str) -> u32 {
    (text.len() as u32).div_ceil(4).max(1)
}
