//! Simulated infrastructure: districts, routing backbone and the store that
//! mutates them.
//!
//! `SimulationStore` is the only writer of `SimulationState`. Presentation
//! layers read `state()` or `subscribe()` to change notifications; they are
//! never a structural dependency of the store.
//!
//! # Invariants
//!
//! - `districts` holds exactly one entry per `DistrictId`, always.
//! - An inactive district has `load == 0` and `health == 0`.
//! - Only `reset()` clears `simulation_active`.

use crate::config::SimulationConfig;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Fixed set of districts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistrictId {
    Nexus,
    Forge,
    Harbor,
    Archive,
    Spire,
    Commons,
    Outpost,
}

impl DistrictId {
    pub const ALL: [DistrictId; 7] = [
        DistrictId::Nexus,
        DistrictId::Forge,
        DistrictId::Harbor,
        DistrictId::Archive,
        DistrictId::Spire,
        DistrictId::Commons,
        DistrictId::Outpost,
    ];

    /// The district carrying GPU acceleration telemetry.
    pub const COMPUTE: DistrictId = DistrictId::Forge;

    pub fn name(&self) -> &'static str {
        match self {
            DistrictId::Nexus => "nexus",
            DistrictId::Forge => "forge",
            DistrictId::Harbor => "harbor",
            DistrictId::Archive => "archive",
            DistrictId::Spire => "spire",
            DistrictId::Commons => "commons",
            DistrictId::Outpost => "outpost",
        }
    }

    /// Load at session start and after `reset()`.
    pub fn baseline_load(&self) -> f64 {
        match self {
            DistrictId::Nexus => 64.0,
            DistrictId::Forge => 71.0,
            DistrictId::Harbor => 42.0,
            DistrictId::Archive => 28.0,
            DistrictId::Spire => 55.0,
            DistrictId::Commons => 47.0,
            DistrictId::Outpost => 19.0,
        }
    }
}

impl std::fmt::Display for DistrictId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for DistrictId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        DistrictId::ALL
            .into_iter()
            .find(|id| id.name() == wanted)
            .ok_or_else(|| format!("Unknown district: {}", s))
    }
}

/// Selected path for inter-district traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingBackbone {
    #[default]
    Primary,
    Secondary,
    Manual,
}

impl RoutingBackbone {
    pub const ALL: [RoutingBackbone; 3] = [
        RoutingBackbone::Primary,
        RoutingBackbone::Secondary,
        RoutingBackbone::Manual,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RoutingBackbone::Primary => "primary",
            RoutingBackbone::Secondary => "secondary",
            RoutingBackbone::Manual => "manual",
        }
    }

    /// Backbone selected by a switch without an explicit target.
    pub fn alternate(&self) -> RoutingBackbone {
        match self {
            RoutingBackbone::Primary => RoutingBackbone::Secondary,
            RoutingBackbone::Secondary => RoutingBackbone::Primary,
            RoutingBackbone::Manual => RoutingBackbone::Primary,
        }
    }
}

impl std::fmt::Display for RoutingBackbone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for RoutingBackbone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        RoutingBackbone::ALL
            .into_iter()
            .find(|b| b.name() == wanted)
            .ok_or_else(|| format!("Unknown backbone: {}", s))
    }
}

/// GPU telemetry of the compute district.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GpuAcceleration {
    pub is_boosted: bool,

    /// Tokens per second
    pub throughput: f64,

    /// Percent of GPU memory in use
    pub memory_used: f64,
}

/// A node of the simulated infrastructure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct District {
    pub id: DistrictId,
    pub is_active: bool,

    /// [0, 100]
    pub load: f64,

    /// [0, 100]
    pub health: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gpu_acceleration: Option<GpuAcceleration>,
}

impl District {
    fn baseline(id: DistrictId, config: &SimulationConfig) -> Self {
        let gpu_acceleration = (id == DistrictId::COMPUTE).then(|| GpuAcceleration {
            is_boosted: false,
            throughput: config.unboosted_throughput,
            memory_used: config.unboosted_memory,
        });
        Self {
            id,
            is_active: true,
            load: id.baseline_load(),
            health: 100.0,
            gpu_acceleration,
        }
    }

    /// Returns true if the district satisfies its own invariants.
    pub fn is_consistent(&self) -> bool {
        let in_range = |v: f64| (0.0..=100.0).contains(&v);
        let offline_zeroed = self.is_active || (self.load == 0.0 && self.health == 0.0);
        offline_zeroed && in_range(self.load) && in_range(self.health)
    }
}

/// Read model consumed by presentation layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationState {
    pub districts: BTreeMap<DistrictId, District>,
    pub routing_backbone: RoutingBackbone,

    /// True once any manual override has been applied since the last reset
    pub simulation_active: bool,
}

impl SimulationState {
    /// All districts active and healthy, default backbone.
    pub fn initial(config: &SimulationConfig) -> Self {
        let districts = DistrictId::ALL
            .into_iter()
            .map(|id| (id, District::baseline(id, config)))
            .collect();
        Self {
            districts,
            routing_backbone: RoutingBackbone::default(),
            simulation_active: false,
        }
    }

    pub fn district(&self, id: DistrictId) -> Option<&District> {
        self.districts.get(&id)
    }

    /// Number of active districts.
    pub fn active_count(&self) -> usize {
        self.districts.values().filter(|d| d.is_active).count()
    }

    /// Checks completeness and the per-district invariants.
    pub fn is_consistent(&self) -> bool {
        DistrictId::ALL.iter().all(|id| {
            self.districts
                .get(id)
                .map_or(false, |d| d.id == *id && d.is_consistent())
        }) && self.districts.len() == DistrictId::ALL.len()
    }
}

/// Handle returned by `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Change listener. Called synchronously after each mutation.
pub type Listener = Box<dyn Fn(&SimulationState) + Send>;

/// Single-writer state machine over `SimulationState`.
pub struct SimulationStore {
    state: SimulationState,
    config: SimulationConfig,

    /// Drives activation load and telemetry drift
    rng: ChaCha8Rng,

    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    tick_count: u64,
}

impl SimulationStore {
    /// Creates a store at the initial baseline.
    pub fn new(rng: ChaCha8Rng, config: SimulationConfig) -> Self {
        Self {
            state: SimulationState::initial(&config),
            config,
            rng,
            listeners: Vec::new(),
            next_subscription: 0,
            tick_count: 0,
        }
    }

    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> SimulationState {
        self.state.clone()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Number of `tick()` calls since creation.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Registers a change listener.
    pub fn subscribe(&mut self, listener: impl Fn(&SimulationState) + Send + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    fn notify(&self) {
        for (_, listener) in &self.listeners {
            listener(&self.state);
        }
    }

    /// Flips a district between active and inactive.
    ///
    /// Activation restores full health and draws a fresh load from the
    /// configured range; deactivation zeroes both.
    pub fn toggle_district(&mut self, id: DistrictId) {
        let (min, max) = (self.config.activation_load_min, self.config.activation_load_max);
        let Some(district) = self.state.districts.get_mut(&id) else {
            return;
        };

        if district.is_active {
            district.is_active = false;
            district.load = 0.0;
            district.health = 0.0;
            info!(district = %id, "district deactivated");
        } else {
            district.is_active = true;
            district.health = 100.0;
            district.load = if max > min { self.rng.gen_range(min..=max) } else { min };
            info!(district = %id, load = district.load, "district activated");
        }

        self.state.simulation_active = true;
        self.notify();
    }

    /// Takes a district offline. Idempotent.
    pub fn fail_district(&mut self, id: DistrictId) {
        let Some(district) = self.state.districts.get_mut(&id) else {
            return;
        };
        if district.is_active {
            district.is_active = false;
            district.load = 0.0;
            district.health = 0.0;
            info!(district = %id, "district failed");
        } else {
            debug!(district = %id, "district already offline");
        }

        self.state.simulation_active = true;
        self.notify();
    }

    /// Selects the routing backbone.
    pub fn set_backbone(&mut self, choice: RoutingBackbone) {
        info!(from = %self.state.routing_backbone, to = %choice, "routing backbone switched");
        self.state.routing_backbone = choice;
        self.state.simulation_active = true;
        self.notify();
    }

    /// Flips GPU boost on the compute district. The new baseline shows up
    /// on the next tick.
    pub fn toggle_gpu_boost(&mut self) {
        let Some(gpu) = self
            .state
            .districts
            .get_mut(&DistrictId::COMPUTE)
            .and_then(|d| d.gpu_acceleration.as_mut())
        else {
            debug!("compute district has no GPU acceleration, boost ignored");
            return;
        };

        gpu.is_boosted = !gpu.is_boosted;
        info!(boosted = gpu.is_boosted, "GPU boost toggled");
        self.notify();
    }

    /// Restores the initial baseline.
    pub fn reset(&mut self) {
        self.state = SimulationState::initial(&self.config);
        info!("simulation reset to baseline");
        self.notify();
    }

    /// Telemetry drift step.
    ///
    /// Only the compute district changes, and only while active: throughput
    /// and memory are redrawn around the boosted or unboosted baseline.
    pub fn tick(&mut self) {
        self.tick_count += 1;

        let Some(district) = self.state.districts.get_mut(&DistrictId::COMPUTE) else {
            return;
        };
        if !district.is_active {
            return;
        }
        let Some(gpu) = district.gpu_acceleration.as_mut() else {
            return;
        };

        let (throughput_base, memory_base) = if gpu.is_boosted {
            (self.config.boosted_throughput, self.config.boosted_memory)
        } else {
            (self.config.unboosted_throughput, self.config.unboosted_memory)
        };

        let (throughput_drift, memory_drift) = match Normal::new(0.0, self.config.drift_std_dev) {
            Ok(noise) => (noise.sample(&mut self.rng), noise.sample(&mut self.rng)),
            Err(_) => (0.0, 0.0),
        };

        gpu.throughput = (throughput_base * (1.0 + throughput_drift)).max(0.0);
        gpu.memory_used = (memory_base * (1.0 + memory_drift)).clamp(0.0, 100.0);

        self.notify();
    }
}
