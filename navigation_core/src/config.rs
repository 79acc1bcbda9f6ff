//! Engine configuration and feature flags.
//!
//! Loaded from TOML with environment overrides on top:
//!
//! ```toml
//! default_mode = "auto"
//! candidate_limit = 5
//!
//! [features]
//! weighted_manual_transitions = true
//! navigation_cache_v2 = true
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::composer::NavigationMode;
use crate::error::ConfigError;

/// Behavioral branches that used to hide behind global flag lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSet {
    /// Order manual transitions by weight (descending) instead of authored position.
    pub weighted_manual_transitions: bool,
    /// Enable the versioned navigation cache. When off the cache is a pass-through.
    pub navigation_cache_v2: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            weighted_manual_transitions: false,
            navigation_cache_v2: true,
        }
    }
}

/// Configuration for the navigation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Mode used by production routing.
    pub default_mode: NavigationMode,

    /// Maximum candidates requested from each strategy.
    pub candidate_limit: usize,

    /// Upper bound on a single strategy call before it counts as unavailable.
    pub strategy_timeout_ms: u64,

    /// TTL of navigation entries.
    pub cache_ttl_secs: u64,

    /// TTL of compass ranking entries.
    pub compass_cache_ttl_secs: u64,

    /// When non-empty, the random strategy only draws nodes carrying one of these tags.
    pub random_tag_whitelist: Vec<String>,

    pub features: FeatureSet,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            default_mode: NavigationMode::Auto,
            candidate_limit: 5,
            strategy_timeout_ms: 2_000,
            cache_ttl_secs: 300,
            compass_cache_ttl_secs: 3_600,
            random_tag_whitelist: Vec::new(),
            features: FeatureSet::default(),
        }
    }
}

impl NavigationConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `NAV_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("NAV_DEFAULT_MODE") {
            self.default_mode = val
                .parse()
                .map_err(|_| invalid("NAV_DEFAULT_MODE", &val))?;
        }
        if let Some(val) = lookup("NAV_CANDIDATE_LIMIT") {
            self.candidate_limit = parse_number("NAV_CANDIDATE_LIMIT", &val)?;
        }
        if let Some(val) = lookup("NAV_STRATEGY_TIMEOUT_MS") {
            self.strategy_timeout_ms = parse_number("NAV_STRATEGY_TIMEOUT_MS", &val)?;
        }
        if let Some(val) = lookup("NAV_CACHE_TTL_SECS") {
            self.cache_ttl_secs = parse_number("NAV_CACHE_TTL_SECS", &val)?;
        }
        if let Some(val) = lookup("NAV_COMPASS_CACHE_TTL_SECS") {
            self.compass_cache_ttl_secs = parse_number("NAV_COMPASS_CACHE_TTL_SECS", &val)?;
        }
        if let Some(val) = lookup("NAV_RANDOM_TAG_WHITELIST") {
            self.random_tag_whitelist = val
                .split(',')
                .map(str::trim)
                .filter(|tag| !tag.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(val) = lookup("NAV_WEIGHTED_MANUAL_TRANSITIONS") {
            self.features.weighted_manual_transitions =
                parse_flag("NAV_WEIGHTED_MANUAL_TRANSITIONS", &val)?;
        }
        if let Some(val) = lookup("NAV_CACHE_V2") {
            self.features.navigation_cache_v2 = parse_flag("NAV_CACHE_V2", &val)?;
        }
        Ok(())
    }

    /// Upper bound for a single strategy call.
    pub fn strategy_timeout(&self) -> Duration {
        Duration::from_millis(self.strategy_timeout_ms)
    }

    /// TTL for cached routes.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// TTL for cached Compass rankings.
    pub fn compass_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.compass_cache_ttl_secs)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = NavigationConfig::default();
        assert_eq!(config.default_mode, NavigationMode::Auto);
        assert_eq!(config.candidate_limit, 5);
        assert!(config.features.navigation_cache_v2);
        assert!(!config.features.weighted_manual_transitions);
    }

    #[test]
    fn test_from_toml_partial() {
        let config = NavigationConfig::from_toml_str(
            r#"
            default_mode = "compass"
            candidate_limit = 3

            [features]
            weighted_manual_transitions = true
            "#,
        )
        .unwrap();

        assert_eq!(config.default_mode, NavigationMode::Compass);
        assert_eq!(config.candidate_limit, 3);
        assert!(config.features.weighted_manual_transitions);
        // Untouched keys keep defaults
        assert!(config.features.navigation_cache_v2);
        assert_eq!(config.cache_ttl_secs, 300);
    }

    #[test]
    fn test_from_toml_rejects_unknown_mode() {
        let result = NavigationConfig::from_toml_str(r#"default_mode = "sideways""#);
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("NAV_DEFAULT_MODE", "echo"),
            ("NAV_CANDIDATE_LIMIT", "9"),
            ("NAV_RANDOM_TAG_WHITELIST", "forest, night,"),
            ("NAV_CACHE_V2", "off"),
        ]
        .into_iter()
        .collect();

        let mut config = NavigationConfig::default();
        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.default_mode, NavigationMode::Echo);
        assert_eq!(config.candidate_limit, 9);
        assert_eq!(config.random_tag_whitelist, vec!["forest", "night"]);
        assert!(!config.features.navigation_cache_v2);
    }

    #[test]
    fn test_env_invalid_value() {
        let mut config = NavigationConfig::default();
        let result = config.apply_env(|key| {
            (key == "NAV_CANDIDATE_LIMIT").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }
}
