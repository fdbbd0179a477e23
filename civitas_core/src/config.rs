//! Configuration for the Civitas core.
//!
//! Every section has a `Default` so a session can start with no file at all.
//! `CivitasConfig::from_json_file` overlays a partial JSON document on those
//! defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Default low-latency model id.
pub const DEFAULT_FAST_MODEL: &str = "civitas-swift-1";

/// Default high-reasoning model id.
pub const DEFAULT_REASONING_MODEL: &str = "civitas-sage-1";

/// Response cache settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry lifetime in seconds
    pub ttl_secs: u64,

    /// Maximum number of stored entries (>= 1)
    pub max_entries: usize,

    /// Responses larger than this are not cached
    pub max_value_bytes: usize,
}

impl CacheConfig {
    /// Entry lifetime.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 300,
            max_entries: 50,
            max_value_bytes: 64 * 1024,
        }
    }
}

/// How the boosted tier interacts with the response cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePolicy {
    /// Both tiers use the cache; keys embed the model id.
    #[default]
    PartitionByTier,

    /// Boosted requests never read or write the cache.
    BypassWhenBoosted,
}

impl CachePolicy {
    /// Returns true if a request on this tier consults the cache.
    pub fn uses_cache(&self, is_boosted: bool) -> bool {
        match self {
            CachePolicy::PartitionByTier => true,
            CachePolicy::BypassWhenBoosted => !is_boosted,
        }
    }
}

/// Inference orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Model used for regular requests
    pub fast_model: String,

    /// Model used for boosted requests
    pub reasoning_model: String,

    pub cache_policy: CachePolicy,

    /// System instruction sent with every generation
    pub system_instruction: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
            cache_policy: CachePolicy::default(),
            system_instruction: crate::tool_call::SYSTEM_INSTRUCTION.to_string(),
        }
    }
}

/// Simulated infrastructure settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Lower bound of the load drawn when a district is re-activated
    pub activation_load_min: f64,

    /// Upper bound of the load drawn when a district is re-activated
    pub activation_load_max: f64,

    /// Compute district throughput baseline (tokens/s) while boosted
    pub boosted_throughput: f64,

    /// Compute district throughput baseline (tokens/s) while not boosted
    pub unboosted_throughput: f64,

    /// Compute district memory baseline (%) while boosted
    pub boosted_memory: f64,

    /// Compute district memory baseline (%) while not boosted
    pub unboosted_memory: f64,

    /// Relative standard deviation of per-tick drift
    pub drift_std_dev: f64,

    /// Telemetry tick period in milliseconds
    pub tick_interval_ms: u64,
}

impl SimulationConfig {
    /// Telemetry tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            activation_load_min: 20.0,
            activation_load_max: 60.0,
            boosted_throughput: 940.0,
            unboosted_throughput: 210.0,
            boosted_memory: 78.0,
            unboosted_memory: 34.0,
            drift_std_dev: 0.04,
            tick_interval_ms: 2000,
        }
    }
}

/// Complete session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CivitasConfig {
    pub cache: CacheConfig,
    pub orchestrator: OrchestratorConfig,

    /// Cost per token keyed by model id
    pub costs: HashMap<String, f64>,

    pub simulation: SimulationConfig,
}

impl Default for CivitasConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            costs: HashMap::from([
                (DEFAULT_FAST_MODEL.to_string(), 0.000_02),
                (DEFAULT_REASONING_MODEL.to_string(), 0.000_5),
            ]),
            simulation: SimulationConfig::default(),
        }
    }
}

impl CivitasConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be >= 1".into()));
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::Invalid("cache.ttl_secs must be > 0".into()));
        }
        let sim = &self.simulation;
        if !(0.0..=100.0).contains(&sim.activation_load_min)
            || !(0.0..=100.0).contains(&sim.activation_load_max)
            || sim.activation_load_min > sim.activation_load_max
        {
            return Err(ConfigError::Invalid(format!(
                "activation load range [{}, {}] must lie within [0, 100]",
                sim.activation_load_min, sim.activation_load_max
            )));
        }
        if !(sim.drift_std_dev.is_finite() && sim.drift_std_dev >= 0.0) {
            return Err(ConfigError::Invalid("simulation.drift_std_dev must be >= 0".into()));
        }
        if sim.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("simulation.tick_interval_ms must be > 0".into()));
        }
        for model in [&self.orchestrator.fast_model, &self.orchestrator.reasoning_model] {
            if !self.costs.contains_key(model) {
                return Err(ConfigError::Invalid(format!("no cost coefficient for model {model}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        CivitasConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_overlays_defaults() {
        let config = CivitasConfig::from_json_str(
            r#"{ "cache": { "max_entries": 2 }, "orchestrator": { "cache_policy": "bypass_when_boosted" } }"#,
        )
        .unwrap();
        assert_eq!(config.cache.max_entries, 2);
        assert_eq!(config.cache.ttl_secs, 300);
        assert_eq!(config.orchestrator.cache_policy, CachePolicy::BypassWhenBoosted);
        assert_eq!(config.orchestrator.fast_model, DEFAULT_FAST_MODEL);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = CivitasConfig::from_json_str(r#"{ "cache": { "max_entries": 0 } }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_unpriced_model() {
        let err = CivitasConfig::from_json_str(r#"{ "orchestrator": { "fast_model": "ghost" } }"#)
            .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_rejects_inverted_load_range() {
        let mut config = CivitasConfig::default();
        config.simulation.activation_load_min = 80.0;
        config.simulation.activation_load_max = 10.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_policy_uses_cache() {
        assert!(CachePolicy::PartitionByTier.uses_cache(true));
        assert!(CachePolicy::PartitionByTier.uses_cache(false));
        assert!(!CachePolicy::BypassWhenBoosted.uses_cache(true));
        assert!(CachePolicy::BypassWhenBoosted.uses_cache(false));
    }
}
