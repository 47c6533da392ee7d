//! Rate-limit tables: tier, provider, and model ceilings plus the static
//! fallback adjacency map.
//!
//! The effective limit for a check is the minimum of the three tables, so no
//! single dimension can be bypassed by manipulating another. Limits are
//! recomputed from the tables on every check, never cached.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

/// A user's subscription level, which sets the base rate-limit ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    /// Free tier.
    Free,
    /// Basic paid tier.
    Basic,
    /// Premium tier.
    Premium,
    /// Enterprise tier.
    Enterprise,
}

impl FromStr for SubscriptionTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "basic" => Ok(Self::Basic),
            "premium" => Ok(Self::Premium),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(()),
        }
    }
}

impl SubscriptionTier {
    /// Canonical tier name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Basic => "basic",
            Self::Premium => "premium",
            Self::Enterprise => "enterprise",
        }
    }
}

/// Limit applied to providers absent from the provider table.
const DEFAULT_PROVIDER_LIMIT: u32 = 50;

/// The configured limit tables.
#[derive(Debug, Clone)]
pub struct RateLimitTables {
    /// Window length for every subject key.
    pub window: Duration,
    tier_limits: HashMap<SubscriptionTier, u32>,
    provider_limits: HashMap<String, u32>,
    model_limits: HashMap<String, u32>,
    fallbacks: HashMap<String, Vec<String>>,
}

impl Default for RateLimitTables {
    fn default() -> Self {
        let tier_limits = HashMap::from([
            (SubscriptionTier::Free, 10),
            (SubscriptionTier::Basic, 30),
            (SubscriptionTier::Premium, 60),
            (SubscriptionTier::Enterprise, 200),
        ]);

        let provider_limits = HashMap::from([
            ("openai".to_string(), 100),
            ("anthropic".to_string(), 50),
            ("vertex".to_string(), 80),
            ("mistral".to_string(), 60),
        ]);

        // Per-model ceilings for cost control.
        let model_limits = HashMap::from([
            ("gpt-4o".to_string(), 20),
            ("gpt-4o-mini".to_string(), 80),
            ("gpt-3.5-turbo".to_string(), 100),
            ("claude-3-5-sonnet".to_string(), 30),
            ("claude-3-haiku".to_string(), 60),
            ("gemini-1.5-pro".to_string(), 40),
            ("gemini-1.5-flash".to_string(), 60),
            ("mixtral-8x7b".to_string(), 40),
        ]);

        // Static adjacency: the first fallback for a provider is always the
        // same provider.
        let fallbacks = HashMap::from([
            (
                "openai".to_string(),
                vec!["anthropic".to_string(), "vertex".to_string(), "mistral".to_string()],
            ),
            (
                "anthropic".to_string(),
                vec!["openai".to_string(), "vertex".to_string(), "mistral".to_string()],
            ),
            (
                "vertex".to_string(),
                vec!["openai".to_string(), "anthropic".to_string(), "mistral".to_string()],
            ),
            (
                "mistral".to_string(),
                vec!["openai".to_string(), "anthropic".to_string(), "vertex".to_string()],
            ),
        ]);

        Self {
            window: Duration::from_secs(60),
            tier_limits,
            provider_limits,
            model_limits,
            fallbacks,
        }
    }
}

impl RateLimitTables {
    /// Builds tables from configuration maps; missing maps keep defaults.
    #[must_use]
    pub fn new(
        window: Duration,
        tier_limits: HashMap<SubscriptionTier, u32>,
        provider_limits: HashMap<String, u32>,
        model_limits: HashMap<String, u32>,
        fallbacks: HashMap<String, Vec<String>>,
    ) -> Self {
        Self { window, tier_limits, provider_limits, model_limits, fallbacks }
    }

    /// Overrides the window length (used by tests for fast expiry).
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// The effective per-window limit: the tightest of the tier, provider,
    /// and model ceilings.
    #[must_use]
    pub fn effective_limit(
        &self,
        tier: SubscriptionTier,
        provider: &str,
        model: Option<&str>,
    ) -> u32 {
        let tier_limit = self
            .tier_limits
            .get(&tier)
            .copied()
            .unwrap_or_else(|| self.tier_limits.get(&SubscriptionTier::Free).copied().unwrap_or(10));
        let provider_limit =
            self.provider_limits.get(provider).copied().unwrap_or(DEFAULT_PROVIDER_LIMIT);

        let mut limit = tier_limit.min(provider_limit);
        if let Some(model_limit) = model.and_then(|m| self.model_limits.get(m)) {
            limit = limit.min(*model_limit);
        }
        limit
    }

    /// The deterministic fallback provider proposed on rejection: the first
    /// configured neighbour.
    #[must_use]
    pub fn fallback_provider(&self, provider: &str) -> Option<&str> {
        self.fallbacks.get(provider).and_then(|list| list.first()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parsing() {
        assert_eq!(SubscriptionTier::from_str("free"), Ok(SubscriptionTier::Free));
        assert_eq!(SubscriptionTier::from_str("Enterprise"), Ok(SubscriptionTier::Enterprise));
        assert!(SubscriptionTier::from_str("gold").is_err());
    }

    #[test]
    fn test_effective_limit_is_min_of_three() {
        let tables = RateLimitTables::default();

        // Premium (60) vs openai (100) vs gpt-4o (20): the model ceiling wins.
        assert_eq!(
            tables.effective_limit(SubscriptionTier::Premium, "openai", Some("gpt-4o")),
            20
        );

        // Free (10) is the tightest even against an expensive model.
        assert_eq!(
            tables.effective_limit(SubscriptionTier::Free, "openai", Some("gpt-4o")),
            10
        );

        // Enterprise (200) vs anthropic (50), no model: provider wins.
        assert_eq!(
            tables.effective_limit(SubscriptionTier::Enterprise, "anthropic", None),
            50
        );
    }

    #[test]
    fn test_unknown_provider_uses_default_ceiling() {
        let tables = RateLimitTables::default();
        assert_eq!(
            tables.effective_limit(SubscriptionTier::Enterprise, "acme-llm", None),
            DEFAULT_PROVIDER_LIMIT
        );
    }

    #[test]
    fn test_fallbacks_are_deterministic() {
        let tables = RateLimitTables::default();
        assert_eq!(tables.fallback_provider("openai"), Some("anthropic"));
        assert_eq!(tables.fallback_provider("anthropic"), Some("openai"));
        assert_eq!(tables.fallback_provider("vertex"), Some("openai"));
        assert_eq!(tables.fallback_provider("mistral"), Some("openai"));
        assert_eq!(tables.fallback_provider("unknown"), None);
    }
}
