//! Scenario runner - executes deterministic session scenarios.

use crate::context::SimContext;
use crate::exporter::{SimEvent, SimExport, SimFrame};
use crate::scenarios::ScenarioId;
use crate::session::{SimSession, Turn};

use civitas_core::tool_call::{NAVIGATE_TO_SECTION, TRIGGER_SIMULATION_EVENT};
use civitas_core::{
    CivitasConfig, DistrictId, GpuAcceleration, InferenceMetrics, OrchestratorError,
    RoutingBackbone, SectionId, SimulationState,
};
use civitas_env::{GenerateResponse, ModelError, RawToolCall, SessionContext};
use serde::Serialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Telemetry ticks sampled by the drift scenario.
const DRIFT_TICKS: usize = 25;

/// Prompt answered by the multi-call drill script.
const DRILL_PROMPT: &str = "run the failover drill";

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Whether scenario passed all assertions
    pub passed: bool,

    /// Final virtual time in seconds
    pub final_time_secs: f64,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Metrics collected during run
    pub metrics: ScenarioMetrics,
}

/// Metrics collected during scenario execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScenarioMetrics {
    pub chat_turns: u64,
    pub cache_hits: u64,

    /// Calls that reached the model, failed ones included
    pub model_calls: u64,
    pub model_errors: u64,

    pub tool_calls_applied: u64,
    pub tool_calls_skipped: u64,

    pub ticks: u64,

    /// Store change notifications
    pub notifications: u64,

    pub evictions: u64,

    /// Sum of per-turn cost estimates
    pub total_cost: f64,

    /// Slowest turn (ms)
    pub max_latency_ms: f64,
}

/// Runs scenarios.
pub struct ScenarioRunner {
    /// Master seed
    seed: u64,

    /// Base configuration; scenarios may override single fields
    config: CivitasConfig,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            config: CivitasConfig::default(),
        }
    }

    /// Sets the base configuration.
    pub fn with_config(mut self, config: CivitasConfig) -> Self {
        self.config = config;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Runs a scenario and returns the result.
    pub async fn run(&self, scenario: ScenarioId) -> ScenarioResult {
        self.run_with_export(scenario).await.0
    }

    /// Runs a scenario and keeps one frame per step.
    pub async fn run_with_export(&self, scenario: ScenarioId) -> (ScenarioResult, SimExport) {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.seed);

        let mut config = self.config.clone();
        if scenario == ScenarioId::CapacityEviction {
            config.cache.max_entries = 2;
        }

        let context = SimContext::shared(self.seed);
        let mut model = SimSession::default_model(&context, &config);
        if scenario == ScenarioId::OrderedDispatch {
            model = model.with_rule(DRILL_PROMPT, drill_response());
        }

        let session = match SimSession::with_model(context.clone(), &config, model) {
            Ok(session) => session,
            Err(err) => {
                warn!("Session setup failed: {}", err);
                let mut export = SimExport::new(scenario.name(), self.seed);
                export.finalize(false, Some(err.to_string()));
                export.stamp(context.system_time());
                let result = ScenarioResult {
                    scenario,
                    seed: self.seed,
                    passed: false,
                    final_time_secs: 0.0,
                    failure_reason: Some(format!("session setup failed: {}", err)),
                    metrics: ScenarioMetrics::default(),
                };
                return (result, export);
            }
        };

        let mut harness = Harness {
            session,
            config,
            export: SimExport::new(scenario.name(), self.seed),
            metrics: ScenarioMetrics::default(),
        };
        harness.record("start", None, Vec::new());

        let outcome = match scenario {
            ScenarioId::CacheWarmup => cache_warmup(&mut harness).await,
            ScenarioId::TtlExpiry => ttl_expiry(&mut harness).await,
            ScenarioId::CapacityEviction => capacity_eviction(&mut harness).await,
            ScenarioId::TierPartition => tier_partition(&mut harness).await,
            ScenarioId::OrderedDispatch => ordered_dispatch(&mut harness).await,
            ScenarioId::GpuDrift => gpu_drift(&mut harness).await,
            ScenarioId::Saturation => saturation(&mut harness).await,
            ScenarioId::ResetRecovery => reset_recovery(&mut harness).await,
        };

        harness.finish(scenario, self.seed, outcome)
    }
}

type Outcome = Result<(), String>;

fn ensure(condition: bool, reason: impl FnOnce() -> String) -> Outcome {
    if condition {
        Ok(())
    } else {
        Err(reason())
    }
}

/// A session plus the bookkeeping every scenario needs.
struct Harness {
    session: SimSession<SimContext>,
    config: CivitasConfig,
    export: SimExport,
    metrics: ScenarioMetrics,
}

impl Harness {
    async fn ask(&mut self, message: &str, is_boosted: bool) -> Result<Turn, OrchestratorError> {
        self.metrics.chat_turns += 1;
        let result = self.session.ask(message, is_boosted).await;

        match &result {
            Ok(turn) => {
                let metrics = turn.response.metrics;
                if metrics.cached {
                    self.metrics.cache_hits += 1;
                }
                self.metrics.total_cost += turn.response.cost_estimate;
                self.metrics.max_latency_ms = self.metrics.max_latency_ms.max(metrics.total_latency_ms);
                self.metrics.tool_calls_applied += turn.dispatch.applied_count() as u64;
                self.metrics.tool_calls_skipped += turn.dispatch.skipped_count() as u64;

                let mut events: Vec<SimEvent> = turn
                    .dispatch
                    .applied
                    .iter()
                    .map(|call| SimEvent::info(format!("applied {:?}", call)))
                    .collect();
                events.extend(turn.dispatch.skipped.iter().map(|skip| {
                    SimEvent::warn(format!("skipped #{} {}: {}", skip.index, skip.name, skip.reason))
                }));
                self.record("chat", Some(metrics), events);
            }
            Err(err) => {
                self.metrics.model_errors += 1;
                self.record("chat", None, vec![SimEvent::warn(err.to_string())]);
            }
        }

        result
    }

    /// Like `ask`, but an error fails the scenario.
    async fn answer(&mut self, message: &str, is_boosted: bool) -> Result<Turn, String> {
        self.ask(message, is_boosted)
            .await
            .map_err(|err| format!("chat {:?} failed: {}", message, err))
    }

    /// One telemetry interval on the virtual clock.
    fn tick(&mut self) {
        let ticks = self.session.advance(self.config.simulation.tick_interval());
        self.metrics.ticks += ticks;
        if ticks > 0 {
            self.record("tick", None, Vec::new());
        }
    }

    fn state(&self) -> SimulationState {
        self.session.snapshot()
    }

    fn model_calls(&self) -> u64 {
        self.session.model().calls()
    }

    fn record(&mut self, step: &str, inference: Option<InferenceMetrics>, events: Vec<SimEvent>) {
        let frame = SimFrame {
            time_sec: self.session.time_secs(),
            step: step.to_string(),
            state: self.session.snapshot(),
            inference,
            events,
        };
        self.export.add_frame(frame);
    }

    fn finish(mut self, scenario: ScenarioId, seed: u64, outcome: Outcome) -> (ScenarioResult, SimExport) {
        let outcome = outcome.and_then(|()| {
            ensure(self.state().is_consistent(), || {
                "final state violates district invariants".to_string()
            })
        });

        self.metrics.model_calls = self.model_calls();
        self.metrics.evictions = self.session.orchestrator().cache().stats().evictions;
        self.metrics.notifications = self.session.notifications();

        let (passed, failure_reason) = match outcome {
            Ok(()) => (true, None),
            Err(reason) => (false, Some(reason)),
        };
        debug!(
            turns = self.metrics.chat_turns,
            hits = self.metrics.cache_hits,
            ticks = self.metrics.ticks,
            "scenario finished"
        );

        self.export.finalize(passed, failure_reason.clone());
        self.export.stamp(self.session.context().system_time());
        let result = ScenarioResult {
            scenario,
            seed,
            passed,
            final_time_secs: self.session.time_secs(),
            failure_reason,
            metrics: self.metrics,
        };
        (result, self.export)
    }
}

fn forge_gpu(state: &SimulationState) -> Result<GpuAcceleration, String> {
    state
        .district(DistrictId::COMPUTE)
        .and_then(|d| d.gpu_acceleration)
        .ok_or_else(|| "compute district lost its GPU telemetry".to_string())
}

fn drill_response() -> GenerateResponse {
    GenerateResponse {
        text: "Running the failover drill.".to_string(),
        tool_calls: vec![
            RawToolCall::new(TRIGGER_SIMULATION_EVENT, json!({ "eventType": "RESET" })),
            RawToolCall::new(
                TRIGGER_SIMULATION_EVENT,
                json!({ "eventType": "FAIL_DISTRICT", "targetId": "harbor" }),
            ),
            RawToolCall::new("launchFireworks", json!({})),
            RawToolCall::new(NAVIGATE_TO_SECTION, json!({ "sectionId": "simulation" })),
            RawToolCall::new(TRIGGER_SIMULATION_EVENT, json!({ "eventType": "FAIL_DISTRICT" })),
        ],
    }
}

async fn cache_warmup(h: &mut Harness) -> Outcome {
    let first = h.answer("What is Civitas?", false).await?;
    let second = h.answer("what is civitas?", false).await?;
    let third = h.answer("  WHAT is   civitas?  ", false).await?;

    ensure(!first.response.metrics.cached, || "first answer came from the cache".into())?;
    ensure(second.response.metrics.cached && third.response.metrics.cached, || {
        "normalized repeats missed the cache".into()
    })?;
    ensure(second.response.text == first.response.text, || "cached text differs".into())?;
    ensure(h.model_calls() == 1, || format!("expected 1 model call, got {}", h.model_calls()))?;
    ensure(
        third.response.metrics.total_latency_ms < first.response.metrics.total_latency_ms,
        || "cache hit was not faster than the model".into(),
    )
}

async fn ttl_expiry(h: &mut Harness) -> Outcome {
    const PROMPT: &str = "What does the Nexus district do?";
    let ttl = h.config.cache.ttl();

    h.answer(PROMPT, false).await?;

    h.session.context().advance_time(ttl.saturating_sub(Duration::from_secs(1)));
    let warm = h.answer(PROMPT, false).await?;
    ensure(warm.response.metrics.cached, || "entry expired before its TTL".into())?;

    h.session.context().advance_time(Duration::from_secs(2));
    let cold = h.answer(PROMPT, false).await?;
    ensure(!cold.response.metrics.cached, || "entry served after its TTL".into())?;

    ensure(h.model_calls() == 2, || format!("expected 2 model calls, got {}", h.model_calls()))
}

async fn capacity_eviction(h: &mut Harness) -> Outcome {
    const A: &str = "tell me about the nexus";
    const B: &str = "tell me about the harbor";
    const C: &str = "tell me about the archive";

    for prompt in [A, B, C] {
        h.answer(prompt, false).await?;
    }

    let cache = h.session.orchestrator().cache().clone();
    ensure(cache.stats().evictions == 1, || {
        format!("expected 1 eviction, got {}", cache.stats().evictions)
    })?;
    ensure(cache.len() == 2, || format!("cache holds {} entries", cache.len()))?;

    let b = h.answer(B, false).await?;
    let c = h.answer(C, false).await?;
    ensure(b.response.metrics.cached && c.response.metrics.cached, || {
        "newer entries were evicted".into()
    })?;

    let a = h.answer(A, false).await?;
    ensure(!a.response.metrics.cached, || "oldest entry survived eviction".into())?;
    ensure(h.model_calls() == 4, || format!("expected 4 model calls, got {}", h.model_calls()))
}

async fn tier_partition(h: &mut Harness) -> Outcome {
    const PROMPT: &str = "How do the districts federate?";

    let fast = h.answer(PROMPT, false).await?;
    let reasoning = h.answer(PROMPT, true).await?;

    ensure(fast.response.model_id != reasoning.response.model_id, || {
        "both tiers answered with the same model".into()
    })?;
    ensure(!reasoning.response.metrics.cached, || "reasoning tier reused a fast answer".into())?;
    ensure(
        reasoning.response.metrics.accelerated && !fast.response.metrics.accelerated,
        || "accelerated flag does not follow the tier".into(),
    )?;

    let boosted_cacheable = h.config.orchestrator.cache_policy.uses_cache(true);
    let again = h.answer(PROMPT, true).await?;
    ensure(again.response.metrics.cached == boosted_cacheable, || {
        format!("boosted repeat cached={} under {:?}", again.response.metrics.cached, h.config.orchestrator.cache_policy)
    })?;

    let fast_again = h.answer(PROMPT, false).await?;
    ensure(fast_again.response.metrics.cached, || "fast tier lost its entry".into())?;

    let expected = if boosted_cacheable { 2 } else { 3 };
    ensure(h.model_calls() == expected, || {
        format!("expected {} model calls, got {}", expected, h.model_calls())
    })
}

async fn ordered_dispatch(h: &mut Harness) -> Outcome {
    h.answer("fail the nexus district", false).await?;

    let drill = h.answer(DRILL_PROMPT, false).await?;
    ensure(drill.dispatch.applied_count() == 3, || {
        format!("expected 3 applied calls, got {}", drill.dispatch.applied_count())
    })?;
    let skipped: Vec<usize> = drill.dispatch.skipped.iter().map(|s| s.index).collect();
    ensure(skipped == vec![2, 4], || format!("skipped indices {:?}", skipped))?;

    let state = h.state();
    let active = |id| state.district(id).map_or(false, |d| d.is_active);
    ensure(!active(DistrictId::Harbor), || "FAIL after RESET did not stick".into())?;
    ensure(active(DistrictId::Nexus), || "RESET did not restore nexus".into())?;
    ensure(state.simulation_active, || "FAIL after RESET left the override flag clear".into())?;
    ensure(h.session.visited_sections() == vec![SectionId::Simulation], || {
        format!("navigated to {:?}", h.session.visited_sections())
    })?;

    // Answers carrying tool calls are never cached.
    let calls_before = h.model_calls();
    let repeat = h.answer(DRILL_PROMPT, false).await?;
    ensure(!repeat.response.metrics.cached, || "tool-call answer was cached".into())?;
    ensure(h.model_calls() == calls_before + 1, || "repeat drill skipped the model".into())
}

async fn gpu_drift(h: &mut Harness) -> Outcome {
    h.answer("boost the gpu cluster", false).await?;

    let boosted = forge_gpu(&h.state())?;
    ensure(boosted.is_boosted, || "boost did not toggle".into())?;
    ensure(!h.state().simulation_active, || "GPU boost counted as a manual override".into())?;

    let sim = h.config.simulation.clone();
    let mut throughput_sum = 0.0;
    for _ in 0..DRIFT_TICKS {
        h.tick();
        let gpu = forge_gpu(&h.state())?;
        ensure(gpu.throughput >= 0.0, || format!("negative throughput {}", gpu.throughput))?;
        ensure((0.0..=100.0).contains(&gpu.memory_used), || {
            format!("memory {} out of range", gpu.memory_used)
        })?;
        throughput_sum += gpu.throughput;
    }

    let mean = throughput_sum / DRIFT_TICKS as f64;
    let tolerance = 6.0 * sim.drift_std_dev / (DRIFT_TICKS as f64).sqrt() * sim.boosted_throughput + 1e-9;
    ensure((mean - sim.boosted_throughput).abs() <= tolerance, || {
        format!("mean throughput {:.1} drifted from {:.1}", mean, sim.boosted_throughput)
    })?;

    h.answer("fail the forge district", false).await?;
    let frozen = forge_gpu(&h.state())?;
    for _ in 0..3 {
        h.tick();
    }
    let state = h.state();
    ensure(forge_gpu(&state)? == frozen, || "offline district kept drifting".into())?;
    let forge = state
        .district(DistrictId::COMPUTE)
        .ok_or_else(|| "compute district missing".to_string())?;
    ensure(!forge.is_active && forge.load == 0.0 && forge.health == 0.0, || {
        "failed forge is not zeroed".into()
    })
}

async fn saturation(h: &mut Harness) -> Outcome {
    const PROMPT: &str = "fail the nexus district";
    let before = h.state();

    h.session.model().fail_next(ModelError::rate_limited("quota exhausted"));
    match h.ask(PROMPT, false).await {
        Err(OrchestratorError::ClusterSaturated(_)) => {}
        other => {
            return Err(format!(
                "expected ClusterSaturated, got {:?}",
                other.map(|turn| turn.response.text)
            ))
        }
    }

    h.session.model().fail_next(ModelError::transport("connection reset"));
    match h.ask(PROMPT, false).await {
        Err(OrchestratorError::InferenceUnavailable(_)) => {}
        other => {
            return Err(format!(
                "expected InferenceUnavailable, got {:?}",
                other.map(|turn| turn.response.text)
            ))
        }
    }

    ensure(h.state() == before, || "failed turns mutated the store".into())?;
    ensure(h.session.orchestrator().cache().is_empty(), || "failed turns were cached".into())?;

    let recovered = h.answer(PROMPT, false).await?;
    ensure(!recovered.response.metrics.cached, || "recovery answer came from the cache".into())?;
    let nexus_active = h.state().district(DistrictId::Nexus).map_or(true, |d| d.is_active);
    ensure(!nexus_active, || "recovered turn did not apply its tool call".into())?;
    ensure(h.metrics.model_errors == 2, || format!("{} model errors", h.metrics.model_errors))
}

async fn reset_recovery(h: &mut Harness) -> Outcome {
    for prompt in [
        "fail the nexus district",
        "take down the outpost",
        "switch transit to manual",
        "boost the gpu",
    ] {
        h.answer(prompt, false).await?;
        ensure(h.state().is_consistent(), || format!("inconsistent after {:?}", prompt))?;
    }
    for _ in 0..3 {
        h.tick();
    }

    let chaos = h.state();
    ensure(chaos.active_count() == DistrictId::ALL.len() - 2, || {
        format!("{} districts active", chaos.active_count())
    })?;
    ensure(chaos.routing_backbone == RoutingBackbone::Manual, || {
        format!("backbone is {}", chaos.routing_backbone)
    })?;
    ensure(chaos.simulation_active, || "overrides did not mark the simulation".into())?;

    h.answer("reset the simulation", false).await?;
    ensure(h.state() == SimulationState::initial(&h.config.simulation), || {
        "reset did not restore the baseline".into()
    })?;

    // Reactivation draws a fresh load from the configured range.
    h.session.with_store(|store| {
        store.toggle_district(DistrictId::Harbor);
        store.toggle_district(DistrictId::Harbor);
    });
    let state = h.state();
    let harbor = state
        .district(DistrictId::Harbor)
        .ok_or_else(|| "harbor missing".to_string())?;
    let sim = &h.config.simulation;
    ensure(harbor.is_active && harbor.health == 100.0, || "harbor did not come back".into())?;
    ensure(
        (sim.activation_load_min..=sim.activation_load_max).contains(&harbor.load),
        || format!("reactivation load {} outside range", harbor.load),
    )?;
    ensure(h.session.notifications() > 0, || "listeners never notified".into())
}
