//! Model capability registry.
//!
//! Static reference data describing each (provider, model) pair. Read-only
//! after construction; entries keep their insertion order, which is the
//! tie-break order for selection.

use serde::{Deserialize, Serialize};

/// Capability row for one (provider, model) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCapability {
    /// Provider name (e.g., "openai").
    pub provider: String,
    /// Model name (e.g., "gpt-4o-mini").
    pub model: String,
    /// Qualitative strengths (e.g., "very_fast", "complex_reasoning").
    pub strengths: Vec<String>,
    /// Qualitative weaknesses.
    pub weaknesses: Vec<String>,
    /// Task tags this model is best suited for.
    pub best_for: Vec<String>,
    /// Blended cost per million tokens, USD.
    pub cost_per_1m_tokens: f64,
    /// Maximum context window, tokens.
    pub max_context_tokens: u32,
    /// Average observed latency, milliseconds.
    pub avg_latency_ms: u64,
}

impl ModelCapability {
    /// Whether the model advertises the given strength.
    #[must_use]
    pub fn has_strength(&self, strength: &str) -> bool {
        self.strengths.iter().any(|s| s == strength)
    }

    /// Whether the model is tagged as best for the given capability.
    #[must_use]
    pub fn is_best_for(&self, tag: &str) -> bool {
        self.best_for.iter().any(|t| t == tag)
    }
}

/// Insertion-ordered registry of model capabilities.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    entries: Vec<ModelCapability>,
}

/// Convenience constructor used by `default_catalog`.
fn capability(
    provider: &str,
    model: &str,
    strengths: &[&str],
    weaknesses: &[&str],
    best_for: &[&str],
    cost_per_1m_tokens: f64,
    max_context_tokens: u32,
    avg_latency_ms: u64,
) -> ModelCapability {
    ModelCapability {
        provider: provider.to_string(),
        model: model.to_string(),
        strengths: strengths.iter().map(|s| (*s).to_string()).collect(),
        weaknesses: weaknesses.iter().map(|s| (*s).to_string()).collect(),
        best_for: best_for.iter().map(|s| (*s).to_string()).collect(),
        cost_per_1m_tokens,
        max_context_tokens,
        avg_latency_ms,
    }
}

impl CapabilityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the production capability catalog.
    #[must_use]
    pub fn default_catalog() -> Self {
        let mut registry = Self::new();

        // OpenAI models
        registry.push(capability(
            "openai",
            "gpt-4o",
            &["high_accuracy", "complex_reasoning", "multimodal", "large_context"],
            &["higher_cost", "slower_than_mini"],
            &["market_intelligence", "technical_analysis", "complex_strategy"],
            5.00,
            128_000,
            2000,
        ));
        registry.push(capability(
            "openai",
            "gpt-4o-mini",
            &["fast", "cost_effective", "good_accuracy", "json_output"],
            &["smaller_context", "less_complex_reasoning"],
            &["real_time", "cost_optimized", "standard_analysis"],
            0.15,
            128_000,
            800,
        ));
        registry.push(capability(
            "openai",
            "gpt-3.5-turbo",
            &["very_fast", "very_cheap", "good_for_simple_tasks"],
            &["lower_accuracy", "limited_reasoning"],
            &["cost_optimized", "simple_tasks", "batch_processing"],
            0.50,
            16_385,
            400,
        ));

        // Anthropic models
        registry.push(capability(
            "anthropic",
            "claude-3-5-sonnet",
            &["excellent_reasoning", "creative_writing", "safety", "large_context"],
            &["higher_cost", "slower"],
            &["creative_content", "complex_strategy", "safety_critical"],
            3.00,
            200_000,
            2500,
        ));
        registry.push(capability(
            "anthropic",
            "claude-3-haiku",
            &["very_fast", "cost_effective", "good_accuracy"],
            &["smaller_context", "less_complex_reasoning"],
            &["real_time", "cost_optimized", "standard_analysis"],
            0.25,
            200_000,
            600,
        ));

        // Google Vertex AI models
        registry.push(capability(
            "vertex",
            "gemini-1.5-pro",
            &["multimodal", "large_context", "good_reasoning"],
            &["variable_latency", "less_mature"],
            &["technical_analysis", "multimodal_tasks"],
            3.50,
            1_000_000,
            1800,
        ));
        registry.push(capability(
            "vertex",
            "gemini-1.5-flash",
            &["very_fast", "cost_effective", "good_accuracy"],
            &["smaller_context"],
            &["real_time", "cost_optimized"],
            0.075,
            1_000_000,
            500,
        ));

        // Mistral models
        registry.push(capability(
            "mistral",
            "mixtral-8x7b",
            &["open_source", "cost_effective", "good_performance"],
            &["less_mature", "variable_quality"],
            &["cost_optimized", "batch_processing"],
            0.14,
            32_768,
            1200,
        ));

        registry
    }

    /// Appends an entry; later entries lose selection ties to earlier ones.
    pub fn push(&mut self, capability: ModelCapability) {
        self.entries.push(capability);
    }

    /// Looks up an entry by provider and model.
    #[must_use]
    pub fn get(&self, provider: &str, model: &str) -> Option<&ModelCapability> {
        self.entries.iter().find(|c| c.provider == provider && c.model == model)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ModelCapability> {
        self.entries.iter()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_contents() {
        let registry = CapabilityRegistry::default_catalog();
        assert_eq!(registry.len(), 8);

        let mini = registry.get("openai", "gpt-4o-mini").unwrap();
        assert!(mini.has_strength("json_output"));
        assert!(mini.is_best_for("real_time"));
        assert!((mini.cost_per_1m_tokens - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn test_lookup_unknown_model() {
        let registry = CapabilityRegistry::default_catalog();
        assert!(registry.get("openai", "gpt-2").is_none());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let registry = CapabilityRegistry::default_catalog();
        let first = registry.iter().next().unwrap();
        assert_eq!(first.model, "gpt-4o");
    }
}
