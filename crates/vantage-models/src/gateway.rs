//! OpenAI-compatible gateway model implementation.
//!
//! Every hosted provider Vantage talks to (OpenAI, Anthropic, Vertex, Mistral)
//! is reached through a chat-completions endpoint speaking the OpenAI wire
//! shape — either natively or via the provider gateway the platform operates.
//! Vendor-specific request formats live outside this crate.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use vantage_abstraction::{
    ChatMessage, Model, ModelError, ModelParameters, ModelResponse, ModelUsage, ResponseFormat,
};

/// Default request timeout for gateway calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// OpenAI-compatible gateway model.
#[derive(Debug, Clone)]
pub struct GatewayModel {
    /// The model identifier (e.g., "gpt-4o-mini", "claude-3-haiku").
    model_id: String,
    /// Provider name used in error reporting (e.g., "openai").
    provider: String,
    /// Base URL for the API endpoint (e.g., "https://api.openai.com/v1").
    base_url: String,
    /// API key for Bearer authentication.
    api_key: String,
    /// HTTP client for requests.
    client: Client,
}

impl GatewayModel {
    /// Creates a new `GatewayModel`.
    ///
    /// # Arguments
    /// * `provider` - Provider name, used for error attribution
    /// * `model_id` - The model identifier
    /// * `base_url` - Base URL of the chat-completions endpoint
    /// * `api_key` - API key for Bearer authentication
    #[must_use]
    pub fn new(provider: String, model_id: String, base_url: String, api_key: String) -> Self {
        Self {
            provider,
            model_id,
            base_url,
            api_key,
            client: Client::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Returns the provider name this model reports errors under.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn map_error_status(&self, status: reqwest::StatusCode, body: String) -> ModelError {
        if status == 401 || status == 403 {
            return ModelError::UnsupportedModelProvider(format!(
                "Authentication failed ({}): {}",
                status, body
            ));
        }

        if status == 402 || status == 429 {
            return ModelError::QuotaExceeded {
                provider: self.provider.clone(),
                message: Some(body),
            };
        }

        if status.is_server_error() {
            return ModelError::ModelResponseError(format!("Server error ({}): {}", status, body));
        }

        ModelError::ModelResponseError(format!("API error ({}): {}", status, body))
    }
}

#[async_trait]
impl Model for GatewayModel {
    async fn generate_text(
        &self,
        prompt: &str,
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            prompt_len = prompt.len(),
            "GatewayModel generating text"
        );

        let messages = vec![ChatMessage::user(prompt)];
        self.generate_chat_completion(&messages, parameters).await
    }

    async fn generate_chat_completion(
        &self,
        messages: &[ChatMessage],
        parameters: Option<ModelParameters>,
    ) -> Result<ModelResponse, ModelError> {
        debug!(
            model_id = %self.model_id,
            message_count = messages.len(),
            parameters = ?parameters,
            "GatewayModel generating chat completion"
        );

        let url = format!("{}/chat/completions", self.base_url);

        let gateway_messages: Vec<GatewayMessage> = messages
            .iter()
            .map(|msg| GatewayMessage { role: msg.role.clone(), content: msg.content.clone() })
            .collect();

        let mut request_body = GatewayRequest {
            model: self.model_id.clone(),
            messages: gateway_messages,
            temperature: None,
            top_p: None,
            max_tokens: None,
            stop: None,
            response_format: None,
        };

        if let Some(params) = parameters {
            request_body.temperature = params.temperature;
            request_body.top_p = params.top_p;
            request_body.max_tokens = params.max_tokens;
            request_body.stop = params.stop_sequences;
            if params.response_format == Some(ResponseFormat::Json) {
                request_body.response_format =
                    Some(GatewayResponseFormat { format_type: "json_object".to_string() });
            }
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, url = %url, "Failed to send request to gateway");
                if e.is_timeout() {
                    ModelError::Timeout { timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64 }
                } else {
                    ModelError::RequestError(format!("Network error: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, error = %body, url = %url, "Gateway returned error status");
            return Err(self.map_error_status(status, body));
        }

        let gateway_response: GatewayResponse = response.json().await.map_err(|e| {
            error!(error = %e, url = %url, "Failed to parse gateway response");
            ModelError::SerializationError(format!("Failed to parse response: {}", e))
        })?;

        let content = gateway_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| {
                ModelError::ModelResponseError("Gateway response contained no choices".to_string())
            })?;

        let usage = gateway_response.usage.map(|u| ModelUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ModelResponse {
            content,
            model_id: Some(gateway_response.model.unwrap_or_else(|| self.model_id.clone())),
            usage,
        })
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// Message in the gateway wire format.
#[derive(Debug, Serialize, Deserialize)]
struct GatewayMessage {
    role: String,
    content: String,
}

/// Gateway chat-completions request body.
#[derive(Debug, Serialize)]
struct GatewayRequest {
    model: String,
    messages: Vec<GatewayMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<GatewayResponseFormat>,
}

#[derive(Debug, Serialize)]
struct GatewayResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// Gateway chat-completions response body.
#[derive(Debug, Deserialize)]
struct GatewayResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<GatewayChoice>,
    #[serde(default)]
    usage: Option<GatewayUsage>,
}

#[derive(Debug, Deserialize)]
struct GatewayChoice {
    message: GatewayMessage,
}

#[derive(Debug, Deserialize)]
struct GatewayUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_model(base_url: String) -> GatewayModel {
        GatewayModel::new(
            "openai".to_string(),
            "gpt-4o-mini".to_string(),
            base_url,
            "test-key".to_string(),
        )
    }

    #[tokio::test]
    async fn test_gateway_parses_completion() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "model": "gpt-4o-mini",
                    "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5}
                }"#,
            )
            .create_async()
            .await;

        let model = test_model(server.url());
        let response = model.generate_text("hello", None).await.unwrap();

        assert_eq!(response.content, "hi there");
        assert_eq!(response.usage.unwrap().total_tokens, 5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_gateway_maps_rate_limit_to_quota_exceeded() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("rate limit exceeded")
            .create_async()
            .await;

        let model = test_model(server.url());
        let err = model.generate_text("hello", None).await.unwrap_err();

        match err {
            ModelError::QuotaExceeded { provider, .. } => assert_eq!(provider, "openai"),
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_gateway_maps_auth_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("bad key")
            .create_async()
            .await;

        let model = test_model(server.url());
        let err = model.generate_text("hello", None).await.unwrap_err();
        assert!(matches!(err, ModelError::UnsupportedModelProvider(_)));
    }
}
