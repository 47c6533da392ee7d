//! Model selection service.
//!
//! Scores capability-registry entries against a request's task type,
//! complexity and priority, and returns the best match with a
//! human-readable justification. No retry or fallback logic lives here;
//! callers fall back by calling again with different criteria.

use super::registry::{CapabilityRegistry, ModelCapability};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use vantage_abstraction::ResponseFormat;

/// Task families a caller can request a model for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionTaskType {
    /// Market trend and competitive analysis.
    MarketIntelligence,
    /// Long-form creative generation.
    CreativeContent,
    /// Precision reasoning over technical material.
    TechnicalAnalysis,
    /// Budget-conscious work.
    CostOptimized,
    /// Latency-sensitive interactive work.
    RealTime,
    /// Large offline batches.
    BatchProcessing,
}

impl SelectionTaskType {
    /// Capability tags that qualify a model for this task family.
    #[must_use]
    pub fn required_capabilities(&self) -> &'static [&'static str] {
        match self {
            Self::MarketIntelligence => {
                &["market_intelligence", "technical_analysis", "complex_strategy"]
            }
            Self::CreativeContent => &["creative_content", "complex_strategy"],
            Self::TechnicalAnalysis => &["technical_analysis", "complex_strategy"],
            Self::CostOptimized => &["cost_optimized", "batch_processing"],
            Self::RealTime => &["real_time", "standard_analysis"],
            Self::BatchProcessing => &["batch_processing", "cost_optimized"],
        }
    }
}

/// Requested complexity tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    /// Simple, latency-friendly work.
    Low,
    /// Ordinary analysis.
    Medium,
    /// Multi-step reasoning.
    High,
}

impl Complexity {
    /// Strength a model must advertise to earn the complexity bonus.
    fn bonus_strength(self) -> &'static str {
        match self {
            Self::Low => "very_fast",
            Self::Medium => "good_accuracy",
            Self::High => "complex_reasoning",
        }
    }
}

/// What the caller wants optimised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionPriority {
    /// Minimise latency.
    Speed,
    /// Maximise answer quality.
    Accuracy,
    /// Minimise spend.
    Cost,
    /// Balance all three.
    Balanced,
}

/// Criteria for one selection call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionCriteria {
    /// The task family.
    pub task_type: SelectionTaskType,
    /// Requested complexity tier.
    pub complexity: Complexity,
    /// What to optimise for.
    pub priority: SelectionPriority,
    /// Expected response shape, if any.
    pub response_format: Option<ResponseFormat>,
}

/// Recommendation produced fresh per selection call; not persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRecommendation {
    /// Recommended provider.
    pub provider: String,
    /// Recommended model.
    pub model: String,
    /// The winning score.
    pub confidence_score: f64,
    /// Which scoring terms contributed, in order.
    pub reasoning: String,
    /// Estimated cost per million tokens, USD.
    pub estimated_cost: f64,
    /// Estimated latency, milliseconds.
    pub estimated_latency_ms: u64,
}

/// Model selection errors.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// No registry entry matches the task type. This is a configuration
    /// error: callers must fail fast, not retry.
    #[error("no model in the capability registry matches task type {0:?}")]
    NoMatchingModel(SelectionTaskType),
}

/// Reference latency used to normalise speed scores.
const MAX_LATENCY_MS: f64 = 3000.0;
/// Reference cost used to normalise cost scores.
const MAX_COST_PER_1M: f64 = 5.00;
/// Bonus for complexity-strength matches and JSON-output support.
const FEATURE_BONUS: f64 = 10.0;

/// Model selection service over a capability registry.
#[derive(Debug, Clone)]
pub struct ModelSelector {
    registry: CapabilityRegistry,
}

impl ModelSelector {
    /// Creates a selector over the given registry.
    #[must_use]
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self { registry }
    }

    /// Creates a selector over the production catalog.
    #[must_use]
    pub fn with_default_catalog() -> Self {
        Self::new(CapabilityRegistry::default_catalog())
    }

    /// The registry backing this selector.
    #[must_use]
    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Selects the best model for the criteria.
    ///
    /// Deterministic for a fixed registry: ties resolve to the earliest
    /// registry entry.
    ///
    /// # Errors
    /// Returns `SelectionError::NoMatchingModel` when no entry matches the
    /// task type.
    pub fn select_model(
        &self,
        criteria: &SelectionCriteria,
    ) -> Result<ModelRecommendation, SelectionError> {
        let required = criteria.task_type.required_capabilities();

        let mut best: Option<(f64, String, &ModelCapability)> = None;
        for candidate in self.registry.iter() {
            if !required.iter().any(|tag| candidate.is_best_for(tag)) {
                continue;
            }

            let (score, reasoning) = Self::score(candidate, criteria);
            // Strict comparison keeps the earliest entry on ties.
            if best.as_ref().is_none_or(|(top, _, _)| score > *top) {
                best = Some((score, reasoning, candidate));
            }
        }

        let (score, reasoning, winner) = best
            .ok_or(SelectionError::NoMatchingModel(criteria.task_type))?;

        debug!(
            provider = %winner.provider,
            model = %winner.model,
            score,
            "Model selected"
        );

        Ok(ModelRecommendation {
            provider: winner.provider.clone(),
            model: winner.model.clone(),
            confidence_score: score,
            reasoning,
            estimated_cost: winner.cost_per_1m_tokens,
            estimated_latency_ms: winner.avg_latency_ms,
        })
    }

    fn score(candidate: &ModelCapability, criteria: &SelectionCriteria) -> (f64, String) {
        let mut score = 0.0;
        let mut reasoning = Vec::new();

        let priority_score = match criteria.priority {
            SelectionPriority::Speed => {
                let s = Self::score_speed(candidate);
                reasoning.push(format!("Speed score: {s:.1}"));
                s
            }
            SelectionPriority::Accuracy => {
                let s = Self::score_accuracy(candidate);
                reasoning.push(format!("Accuracy score: {s:.1}"));
                s
            }
            SelectionPriority::Cost => {
                let s = Self::score_cost(candidate);
                reasoning.push(format!("Cost score: {s:.1}"));
                s
            }
            SelectionPriority::Balanced => {
                let s = (Self::score_speed(candidate)
                    + Self::score_accuracy(candidate)
                    + Self::score_cost(candidate))
                    / 3.0;
                reasoning.push(format!("Balanced score: {s:.1}"));
                s
            }
        };
        score += priority_score;

        let bonus_strength = criteria.complexity.bonus_strength();
        if candidate.has_strength(bonus_strength) {
            score += FEATURE_BONUS;
            reasoning.push(format!("Complexity match ({bonus_strength}): +{FEATURE_BONUS}"));
        }

        if criteria.response_format == Some(ResponseFormat::Json)
            && candidate.has_strength("json_output")
        {
            score += FEATURE_BONUS;
            reasoning.push(format!("JSON output capability: +{FEATURE_BONUS}"));
        }

        (score, reasoning.join(", "))
    }

    /// Lower latency scores higher, normalised against the slowest expected model.
    fn score_speed(candidate: &ModelCapability) -> f64 {
        (100.0 - (candidate.avg_latency_ms as f64 / MAX_LATENCY_MS) * 100.0).max(0.0)
    }

    /// Fixed per-model accuracy table.
    fn score_accuracy(candidate: &ModelCapability) -> f64 {
        match candidate.model.as_str() {
            "gpt-4o" => 95.0,
            "claude-3-5-sonnet" => 90.0,
            "gemini-1.5-pro" => 85.0,
            "gpt-4o-mini" => 80.0,
            "claude-3-haiku" => 75.0,
            "gemini-1.5-flash" => 70.0,
            "gpt-3.5-turbo" => 65.0,
            "mixtral-8x7b" => 60.0,
            _ => 50.0,
        }
    }

    /// Lower cost scores higher, normalised against the priciest expected model.
    fn score_cost(candidate: &ModelCapability) -> f64 {
        (100.0 - (candidate.cost_per_1m_tokens / MAX_COST_PER_1M) * 100.0).max(0.0)
    }
}
