//! Deterministic scenarios for the Civitas session.

use serde::Serialize;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioId {
    /// SIM-001: repeated and re-spaced prompts hit the cache
    CacheWarmup,

    /// SIM-002: entries older than the TTL go back to the model
    TtlExpiry,

    /// SIM-003: over-capacity inserts evict the oldest entry
    CapacityEviction,

    /// SIM-004: fast and reasoning tiers never share answers
    TierPartition,

    /// SIM-005: tool calls apply in order, bad ones are skipped
    OrderedDispatch,

    /// SIM-006: GPU telemetry drifts around the boost baseline
    GpuDrift,

    /// SIM-007: model outages surface as typed errors
    Saturation,

    /// SIM-008: chaos followed by a reset returns to baseline
    ResetRecovery,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CacheWarmup,
            ScenarioId::TtlExpiry,
            ScenarioId::CapacityEviction,
            ScenarioId::TierPartition,
            ScenarioId::OrderedDispatch,
            ScenarioId::GpuDrift,
            ScenarioId::Saturation,
            ScenarioId::ResetRecovery,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CacheWarmup => "cache_warmup",
            ScenarioId::TtlExpiry => "ttl_expiry",
            ScenarioId::CapacityEviction => "capacity_eviction",
            ScenarioId::TierPartition => "tier_partition",
            ScenarioId::OrderedDispatch => "ordered_dispatch",
            ScenarioId::GpuDrift => "gpu_drift",
            ScenarioId::Saturation => "saturation",
            ScenarioId::ResetRecovery => "reset_recovery",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CacheWarmup => "Same prompt three times with case and spacing changes, one model call",
            ScenarioId::TtlExpiry => "Answer cached, clock jumps past the TTL, model called again",
            ScenarioId::CapacityEviction => "Capacity 2, prompts A B C, A evicted and B C still cached",
            ScenarioId::TierPartition => "Same prompt on both tiers, no cross-tier cache hit",
            ScenarioId::OrderedDispatch => "RESET then FAIL_DISTRICT plus an unknown tool in one answer",
            ScenarioId::GpuDrift => "Boost the Forge, tick telemetry, then fail it and check it freezes",
            ScenarioId::Saturation => "Rate-limit and transport failures leave cache and store untouched",
            ScenarioId::ResetRecovery => "Fail districts, reroute, reset, verify the baseline",
        }
    }

    /// One `name  description` line per scenario, for CLI help.
    pub fn catalogue() -> String {
        let width = Self::all().iter().map(|s| s.name().len()).max().unwrap_or(0);
        Self::all()
            .iter()
            .map(|s| format!("  {:<width$}  {}\n", s.name(), s.description(), width = width))
            .collect()
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cache_warmup" | "cachewarmup" | "sim-001" => Ok(ScenarioId::CacheWarmup),
            "ttl_expiry" | "ttlexpiry" | "sim-002" => Ok(ScenarioId::TtlExpiry),
            "capacity_eviction" | "capacityeviction" | "sim-003" => Ok(ScenarioId::CapacityEviction),
            "tier_partition" | "tierpartition" | "sim-004" => Ok(ScenarioId::TierPartition),
            "ordered_dispatch" | "ordereddispatch" | "sim-005" => Ok(ScenarioId::OrderedDispatch),
            "gpu_drift" | "gpudrift" | "sim-006" => Ok(ScenarioId::GpuDrift),
            "saturation" | "sim-007" => Ok(ScenarioId::Saturation),
            "reset_recovery" | "resetrecovery" | "sim-008" => Ok(ScenarioId::ResetRecovery),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
