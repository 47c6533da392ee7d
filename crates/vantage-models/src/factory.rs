//! Model factory for creating model instances from configuration.
//!
//! This module provides functionality to create model instances based on configuration,
//! handling API key loading from environment variables.

use crate::{GatewayModel, MockModel};
use std::env;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};
use vantage_abstraction::{Model, ModelError};

/// Model type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    /// Mock model for testing.
    Mock,
    /// OpenAI hosted models.
    OpenAi,
    /// Anthropic hosted models.
    Anthropic,
    /// Google Vertex AI hosted models.
    Vertex,
    /// Mistral hosted models.
    Mistral,
}

impl FromStr for ModelType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mock" => Ok(Self::Mock),
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "vertex" | "gemini" => Ok(Self::Vertex),
            "mistral" => Ok(Self::Mistral),
            _ => Err(()),
        }
    }
}

impl ModelType {
    /// Canonical provider name used in rate limiting and capability lookups.
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::Mock => "mock",
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Vertex => "vertex",
            Self::Mistral => "mistral",
        }
    }

    /// Environment variable holding the provider's API key.
    fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::Mock => None,
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Vertex => Some("VERTEX_API_KEY"),
            Self::Mistral => Some("MISTRAL_API_KEY"),
        }
    }

    /// Default gateway base URL for the provider.
    fn default_base_url(&self) -> Option<&'static str> {
        match self {
            Self::Mock => None,
            Self::OpenAi => Some("https://api.openai.com/v1"),
            Self::Anthropic => Some("https://gateway.vantage.dev/anthropic/v1"),
            Self::Vertex => Some("https://gateway.vantage.dev/vertex/v1"),
            Self::Mistral => Some("https://api.mistral.ai/v1"),
        }
    }
}

/// Model configuration.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// The type of model to create.
    pub model_type: ModelType,
    /// The model ID (e.g., "gpt-4o-mini", "claude-3-haiku").
    pub model_id: String,
    /// Optional API key (if not provided, will be loaded from environment).
    pub api_key: Option<String>,
    /// Optional base URL overriding the provider default.
    pub base_url: Option<String>,
}

impl ModelConfig {
    /// Creates a new `ModelConfig` with the given type and model ID.
    ///
    /// # Arguments
    /// * `model_type` - The type of model
    /// * `model_id` - The model ID
    #[must_use]
    pub fn new(model_type: ModelType, model_id: String) -> Self {
        Self { model_type, model_id, api_key: None, base_url: None }
    }

    /// Sets the API key for this configuration.
    #[must_use]
    pub fn with_api_key(mut self, api_key: String) -> Self {
        self.api_key = Some(api_key);
        self
    }

    /// Sets the base URL for this configuration.
    #[must_use]
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }
}

/// Factory for creating model instances.
pub struct ModelFactory;

impl ModelFactory {
    /// Creates a model instance from the given configuration.
    ///
    /// # Arguments
    /// * `config` - The model configuration
    ///
    /// # Errors
    /// Returns a `ModelError` if model creation fails (e.g., missing API key).
    #[allow(clippy::disallowed_methods)] // env::var is needed for API key loading
    pub fn create(config: ModelConfig) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        debug!(
            model_type = ?config.model_type,
            model_id = %config.model_id,
            "Creating model instance"
        );

        if config.model_type == ModelType::Mock {
            return Ok(Arc::new(MockModel::new(config.model_id)));
        }

        let api_key = match config.api_key {
            Some(key) => key,
            None => {
                let var = config
                    .model_type
                    .api_key_var()
                    .expect("hosted model types declare an API key variable");
                env::var(var).map_err(|_| {
                    ModelError::UnsupportedModelProvider(format!(
                        "{} environment variable not set",
                        var
                    ))
                })?
            }
        };

        let base_url = config.base_url.unwrap_or_else(|| {
            config
                .model_type
                .default_base_url()
                .expect("hosted model types declare a base URL")
                .to_string()
        });

        Ok(Arc::new(GatewayModel::new(
            config.model_type.provider_name().to_string(),
            config.model_id,
            base_url,
            api_key,
        )))
    }

    /// Creates a model instance from a provider string and model ID.
    ///
    /// # Arguments
    /// * `provider` - String representation of the provider
    /// * `model_id` - The model ID
    ///
    /// # Errors
    /// Returns a `ModelError` if the provider is unrecognized or creation fails.
    pub fn create_from_str(
        provider: &str,
        model_id: String,
    ) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        let model_type = ModelType::from_str(provider).map_err(|()| {
            error!(provider = %provider, "Unrecognized provider");
            ModelError::UnsupportedModelProvider(format!("Unrecognized provider: {}", provider))
        })?;

        Self::create(ModelConfig::new(model_type, model_id))
    }

    /// Creates a model instance with an explicit API key.
    ///
    /// # Arguments
    /// * `provider` - String representation of the provider
    /// * `model_id` - The model ID
    /// * `api_key` - The API key to use
    ///
    /// # Errors
    /// Returns a `ModelError` if the provider is unrecognized or creation fails.
    pub fn create_with_api_key(
        provider: &str,
        model_id: String,
        api_key: String,
    ) -> Result<Arc<dyn Model + Send + Sync>, ModelError> {
        let model_type = ModelType::from_str(provider).map_err(|()| {
            error!(provider = %provider, "Unrecognized provider");
            ModelError::UnsupportedModelProvider(format!("Unrecognized provider: {}", provider))
        })?;

        Self::create(ModelConfig::new(model_type, model_id).with_api_key(api_key))
    }
}
