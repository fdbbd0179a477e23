//! Tool Call Dispatcher - applies model tool calls to the simulation.
//!
//! Calls are applied strictly in the order received: `[RESET, FAIL_DISTRICT x]`
//! leaves `x` failed. Each call performs exactly one navigation or exactly
//! one store operation. Unknown or malformed calls are logged and skipped;
//! they never stop later calls from being applied.

use crate::simulation::SimulationStore;
use crate::tool_call::{SectionId, SimulationEvent, ToolCall, ToolCallError};
use civitas_env::RawToolCall;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// External UI collaborator that scrolls the dashboard.
pub trait Navigator: Send + Sync {
    fn navigate(&self, section: SectionId);
}

/// Navigator for headless sessions: only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingNavigator;

impl Navigator for LoggingNavigator {
    fn navigate(&self, section: SectionId) {
        info!(%section, "navigate");
    }
}

/// A call that was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCall {
    /// Position in the dispatched batch
    pub index: usize,
    pub name: String,
    pub reason: String,
}

/// Outcome of one `dispatch`.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Applied calls, in application order
    pub applied: Vec<ToolCall>,
    pub skipped: Vec<SkippedCall>,
}

impl DispatchReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

/// Maps tool calls onto store mutations or navigation.
pub struct ToolCallDispatcher {
    navigator: Arc<dyn Navigator>,
}

impl ToolCallDispatcher {
    pub fn new(navigator: Arc<dyn Navigator>) -> Self {
        Self { navigator }
    }

    /// Dispatcher that only logs navigation.
    pub fn headless() -> Self {
        Self::new(Arc::new(LoggingNavigator))
    }

    /// Interprets and applies a batch of raw calls in order.
    pub fn dispatch(&self, store: &mut SimulationStore, calls: &[RawToolCall]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (index, raw) in calls.iter().enumerate() {
            match ToolCall::parse(raw) {
                Ok(call) => {
                    self.apply(store, call);
                    report.applied.push(call);
                }
                Err(err) => {
                    match &err {
                        ToolCallError::UnknownTool(name) => {
                            warn!(index, tool = %name, "ignoring unknown tool call");
                        }
                        ToolCallError::InvalidArgs { tool, reason } => {
                            warn!(index, %tool, %reason, "ignoring malformed tool call");
                        }
                    }
                    report.skipped.push(SkippedCall {
                        index,
                        name: raw.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }

        debug!(
            applied = report.applied_count(),
            skipped = report.skipped_count(),
            "tool calls dispatched"
        );
        report
    }

    /// Applies one interpreted call.
    pub fn apply(&self, store: &mut SimulationStore, call: ToolCall) {
        match call {
            ToolCall::Navigate { section } => self.navigator.navigate(section),
            ToolCall::SimulationEvent(SimulationEvent::FailDistrict(id)) => store.fail_district(id),
            ToolCall::SimulationEvent(SimulationEvent::SwitchTransit(Some(backbone))) => {
                store.set_backbone(backbone)
            }
            ToolCall::SimulationEvent(SimulationEvent::SwitchTransit(None)) => {
                let next = store.state().routing_backbone.alternate();
                store.set_backbone(next)
            }
            ToolCall::SimulationEvent(SimulationEvent::Reset) => store.reset(),
            ToolCall::ToggleGpuBoost => store.toggle_gpu_boost(),
        }
    }
}
