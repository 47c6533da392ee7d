//! Core configuration loading.
//!
//! Configuration is TOML with code defaults for everything, so a missing
//! file or a partial file is never fatal during development.

use crate::insights::{EpochAnchor, EpochTimezone, InsightCacheConfig};
use crate::ratelimit::{RateLimitTables, SubscriptionTier};
use chrono::Weekday;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use vantage_orchestrator::RetryPolicy;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    rate_limits: RawRateLimits,
    #[serde(default)]
    cache: RawCache,
    #[serde(default)]
    retry: RawRetry,
}

#[derive(Debug, Default, Deserialize)]
struct RawRateLimits {
    window_secs: Option<u64>,
    #[serde(default)]
    tiers: HashMap<String, u32>,
    #[serde(default)]
    providers: HashMap<String, u32>,
    #[serde(default)]
    models: HashMap<String, u32>,
    #[serde(default)]
    fallbacks: HashMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCache {
    epoch_weekday: Option<String>,
    epoch_timezone: Option<String>,
    refresh_limit_hours: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRetry {
    max_attempts: Option<u32>,
    backoff_base_ms: Option<u64>,
}

/// Resolved core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Rate-limit tables.
    pub rate_limits: RateLimitTables,
    /// Insight cache settings.
    pub cache: InsightCacheConfig,
    /// Retry policy for the execution engine.
    pub retry: RetryPolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimitTables::default(),
            cache: InsightCacheConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CoreConfig {
    /// Loads configuration from a TOML file, applying defaults for anything
    /// not set.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the file cannot be read, parsed, or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(&std::fs::read_to_string(path)?)?;
        debug!(path = %path.display(), "Loaded core configuration");
        Self::from_raw(raw)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the content cannot be parsed or validated.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Self::from_raw(toml::from_str(content)?)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let defaults = RateLimitTables::default();

        let window_secs = raw.rate_limits.window_secs.unwrap_or(60);
        if window_secs == 0 {
            return Err(ConfigError::Invalid("rate_limits.window_secs must be > 0".to_string()));
        }

        let mut tier_limits = HashMap::new();
        for (name, limit) in &raw.rate_limits.tiers {
            let tier = SubscriptionTier::from_str(name).map_err(|()| {
                ConfigError::Invalid(format!("unknown subscription tier '{name}'"))
            })?;
            tier_limits.insert(tier, *limit);
        }

        let rate_limits = if tier_limits.is_empty()
            && raw.rate_limits.providers.is_empty()
            && raw.rate_limits.models.is_empty()
            && raw.rate_limits.fallbacks.is_empty()
        {
            defaults.with_window(Duration::from_secs(window_secs))
        } else {
            // Explicit tables replace the defaults wholesale; partial
            // overrides of individual rows are not supported.
            let mut full_tiers: HashMap<SubscriptionTier, u32> = HashMap::from([
                (SubscriptionTier::Free, 10),
                (SubscriptionTier::Basic, 30),
                (SubscriptionTier::Premium, 60),
                (SubscriptionTier::Enterprise, 200),
            ]);
            full_tiers.extend(tier_limits);
            RateLimitTables::new(
                Duration::from_secs(window_secs),
                full_tiers,
                raw.rate_limits.providers,
                raw.rate_limits.models,
                raw.rate_limits.fallbacks,
            )
        };

        let weekday = match raw.cache.epoch_weekday.as_deref() {
            None => Weekday::Mon,
            Some(name) => parse_weekday(name)
                .ok_or_else(|| ConfigError::Invalid(format!("unknown weekday '{name}'")))?,
        };
        let timezone = match raw.cache.epoch_timezone.as_deref() {
            None | Some("utc") => EpochTimezone::Utc,
            Some("local") => EpochTimezone::Local,
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "epoch_timezone must be 'utc' or 'local', got '{other}'"
                )));
            }
        };
        let refresh_limit_hours = raw.cache.refresh_limit_hours.unwrap_or(24);
        if refresh_limit_hours == 0 {
            return Err(ConfigError::Invalid("cache.refresh_limit_hours must be > 0".to_string()));
        }

        let max_attempts = raw.retry.max_attempts.unwrap_or(3);
        if max_attempts == 0 {
            return Err(ConfigError::Invalid("retry.max_attempts must be >= 1".to_string()));
        }

        Ok(Self {
            rate_limits,
            cache: InsightCacheConfig {
                anchor: EpochAnchor { weekday, timezone },
                refresh_limit: Duration::from_secs(refresh_limit_hours * 60 * 60),
            },
            retry: RetryPolicy {
                max_attempts,
                backoff_base: Duration::from_millis(raw.retry.backoff_base_ms.unwrap_or(1000)),
            },
        })
    }
}

fn parse_weekday(name: &str) -> Option<Weekday> {
    match name.to_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}
