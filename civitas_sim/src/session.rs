//! SimSession - one operator session wired end to end.
//!
//! Owns the orchestrator, the simulation store and the dispatcher, the same
//! way the dashboard does: a chat turn goes through the orchestrator, and any
//! tool calls in the answer are applied to the store in order.

use crate::context::SimContext;
use crate::model::ScriptedModel;

use civitas_core::{
    ChatResponse, CivitasConfig, CostEstimator, DispatchReport, InferenceOrchestrator, Navigator,
    OrchestratorError, ResponseCache, SectionId, SimulationState, SimulationStore,
    ToolCallDispatcher,
};
use civitas_env::SessionContext;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// RNG stream feeding the simulation store.
pub const STORE_RNG_STREAM: u64 = 1;

/// Scripted latency of the fast tier.
pub const FAST_LATENCY: Duration = Duration::from_millis(400);

/// Scripted latency of the reasoning tier.
pub const REASONING_LATENCY: Duration = Duration::from_millis(1800);

/// Navigator that remembers where it was sent.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    visited: Mutex<Vec<SectionId>>,
}

impl RecordingNavigator {
    pub fn visited(&self) -> Vec<SectionId> {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn navigate(&self, section: SectionId) {
        debug!(%section, "navigate");
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(section);
    }
}

/// Result of one chat turn.
#[derive(Debug, Clone)]
pub struct Turn {
    pub response: ChatResponse,
    pub dispatch: DispatchReport,
}

/// A complete operator session over a scripted model.
pub struct SimSession<Ctx: SessionContext> {
    context: Arc<Ctx>,
    model: Arc<ScriptedModel<Ctx>>,
    orchestrator: InferenceOrchestrator<Ctx, ScriptedModel<Ctx>>,
    store: Arc<Mutex<SimulationStore>>,
    dispatcher: ToolCallDispatcher,
    navigator: Arc<RecordingNavigator>,

    /// Store change notifications observed
    notifications: Arc<AtomicU64>,

    tick_interval: Duration,

    /// Virtual time (ns) covered by telemetry ticks so far
    ticked_until: AtomicU64,
}

impl<Ctx: SessionContext> SimSession<Ctx> {
    /// Creates a session with the default scripted model.
    pub fn new(context: Arc<Ctx>, config: &CivitasConfig) -> Result<Self, OrchestratorError> {
        let model = Self::default_model(&context, config);
        Self::with_model(context, config, model)
    }

    /// Scripted model with per-tier latencies, ready for extra rules.
    pub fn default_model(context: &Arc<Ctx>, config: &CivitasConfig) -> ScriptedModel<Ctx> {
        ScriptedModel::new(context.clone(), FAST_LATENCY)
            .with_latency(config.orchestrator.fast_model.clone(), FAST_LATENCY)
            .with_latency(config.orchestrator.reasoning_model.clone(), REASONING_LATENCY)
    }

    /// Creates a session around a caller-built model.
    pub fn with_model(
        context: Arc<Ctx>,
        config: &CivitasConfig,
        model: ScriptedModel<Ctx>,
    ) -> Result<Self, OrchestratorError> {
        let model = Arc::new(model);
        let cache = ResponseCache::shared(context.clone(), config.cache.clone());
        let orchestrator = InferenceOrchestrator::new(
            context.clone(),
            model.clone(),
            cache,
            CostEstimator::new(config.costs.clone()),
            config.orchestrator.clone(),
        )?;

        let mut store = SimulationStore::new(
            context.derive_rng(STORE_RNG_STREAM),
            config.simulation.clone(),
        );
        let notifications = Arc::new(AtomicU64::new(0));
        let counter = notifications.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        let navigator = Arc::new(RecordingNavigator::default());

        Ok(Self {
            context,
            model,
            orchestrator,
            store: Arc::new(Mutex::new(store)),
            dispatcher: ToolCallDispatcher::new(navigator.clone()),
            navigator,
            notifications,
            tick_interval: config.simulation.tick_interval(),
            ticked_until: AtomicU64::new(0),
        })
    }

    /// Sends one message and applies the returned tool calls.
    pub async fn ask(&self, message: &str, is_boosted: bool) -> Result<Turn, OrchestratorError> {
        let response = self.orchestrator.chat(message, is_boosted).await?;
        let dispatch = {
            let mut store = self.lock_store();
            self.dispatcher.dispatch(&mut store, &response.tool_calls)
        };
        Ok(Turn { response, dispatch })
    }

    /// Runs `f` against the store.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut SimulationStore) -> R) -> R {
        f(&mut self.lock_store())
    }

    pub fn snapshot(&self) -> SimulationState {
        self.lock_store().snapshot()
    }

    pub fn context(&self) -> &Arc<Ctx> {
        &self.context
    }

    pub fn model(&self) -> &ScriptedModel<Ctx> {
        &self.model
    }

    pub fn orchestrator(&self) -> &InferenceOrchestrator<Ctx, ScriptedModel<Ctx>> {
        &self.orchestrator
    }

    /// Shared store handle, for the telemetry ticker.
    pub fn store(&self) -> Arc<Mutex<SimulationStore>> {
        self.store.clone()
    }

    pub fn visited_sections(&self) -> Vec<SectionId> {
        self.navigator.visited()
    }

    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    pub fn time_secs(&self) -> f64 {
        self.context.now().as_secs_f64()
    }

    fn lock_store(&self) -> MutexGuard<'_, SimulationStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SimSession<SimContext> {
    /// Moves the virtual clock forward and runs one telemetry tick for every
    /// full interval elapsed since the last tick, chat latency included.
    ///
    /// Stands in for `TelemetryTicker` on the virtual clock, where a
    /// sleeping tick loop would never yield to the session.
    pub fn advance(&self, by: Duration) -> u64 {
        self.context.advance_time(by);
        let interval = self.tick_interval.as_nanos() as u64;
        if interval == 0 {
            return 0;
        }

        let last = self.ticked_until.load(Ordering::SeqCst);
        let due = self.context.time_ns().saturating_sub(last) / interval;
        if due > 0 {
            self.ticked_until.store(last + due * interval, Ordering::SeqCst);
            let mut store = self.lock_store();
            for _ in 0..due {
                store.tick();
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use civitas_core::{DistrictId, RoutingBackbone};

    fn session(seed: u64) -> SimSession<SimContext> {
        SimSession::new(SimContext::shared(seed), &CivitasConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_ask_applies_tool_calls() {
        let session = session(3);

        let turn = session.ask("fail the spire district", false).await.unwrap();
        assert_eq!(turn.dispatch.applied_count(), 1);

        let state = session.snapshot();
        assert!(!state.district(DistrictId::Spire).unwrap().is_active);
        assert!(state.simulation_active);
        assert!(session.notifications() >= 1);
    }

    #[tokio::test]
    async fn test_switch_without_target_flips_backbone() {
        let session = session(3);
        session.ask("switch the transit backbone", false).await.unwrap();
        assert_eq!(session.snapshot().routing_backbone, RoutingBackbone::Secondary);
        session.ask("switch the transit backbone again", false).await.unwrap();
        assert_eq!(session.snapshot().routing_backbone, RoutingBackbone::Primary);
    }

    #[tokio::test]
    async fn test_navigation_is_recorded() {
        let session = session(3);
        session.ask("show me the districts", false).await.unwrap();
        assert_eq!(session.visited_sections(), vec![SectionId::Districts]);
    }

    #[tokio::test]
    async fn test_model_latency_drives_session_clock() {
        let session = session(3);
        session.ask("hello", false).await.unwrap();
        assert_eq!(session.context().now(), FAST_LATENCY);
        session.ask("hello", true).await.unwrap();
        assert_eq!(session.context().now(), FAST_LATENCY + REASONING_LATENCY);
    }

    #[tokio::test]
    async fn test_advance_ticks_once_per_elapsed_interval() {
        let session = session(3);
        session.ask("boost the gpu cluster", false).await.unwrap();
        let boosted = session.snapshot();

        // 400 ms of chat latency plus 1.6 s reaches the first 2 s boundary
        assert_eq!(session.advance(Duration::from_millis(1600)), 1);
        assert_ne!(session.snapshot(), boosted);

        assert_eq!(session.advance(Duration::from_secs(5)), 2);
        assert_eq!(session.advance(Duration::from_secs(1)), 1);
        assert_eq!(session.advance(Duration::from_millis(500)), 0);
        assert_eq!(session.context().now(), Duration::from_millis(8500));
    }

    #[test]
    fn test_unknown_tier_rejected() {
        let mut config = CivitasConfig::default();
        config.orchestrator.reasoning_model = "mystery".into();
        let result = SimSession::new(SimContext::shared(1), &config);
        assert!(matches!(result, Err(OrchestratorError::UnknownTier(_))));
    }
}
