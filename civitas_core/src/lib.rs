//! Civitas Core - Inference Orchestration & Simulation Control
//!
//! The request-response core of the Civitas federated-platform dashboard:
//! 1. **Inference**: tier routing, response caching and cost telemetry for chat requests
//! 2. **Interpretation**: a closed tool-call vocabulary returned by the model
//! 3. **Simulation**: an in-memory district/backbone state machine mutated by those calls
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                   InferenceOrchestrator                      │
//! │   ResponseCache ◄──── chat(message, boost) ────► Model       │
//! │         │                                  CostEstimator     │
//! └─────────┼────────────────────────────────────────────────────┘
//!           │ tool_calls
//!           ▼
//! ┌───────────────────┐        ┌──────────────────────────────────┐
//! │ ToolCallDispatcher│ ─────► │ SimulationStore ◄─ TelemetryTicker │
//! │   (Navigator)     │        │   districts / backbone           │
//! └───────────────────┘        └──────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod cost;
pub mod dispatcher;
pub mod error;
pub mod orchestrator;
pub mod simulation;
pub mod ticker;
pub mod tool_call;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use cache::{CacheEntry, CacheKey, CacheStats, ResponseCache};
pub use config::{CacheConfig, CachePolicy, CivitasConfig, OrchestratorConfig, SimulationConfig};
pub use cost::CostEstimator;
pub use dispatcher::{DispatchReport, LoggingNavigator, Navigator, SkippedCall, ToolCallDispatcher};
pub use error::{ConfigError, OrchestratorError};
pub use orchestrator::{ChatResponse, InferenceMetrics, InferenceOrchestrator};
pub use simulation::{
    District, DistrictId, GpuAcceleration, RoutingBackbone, SimulationState, SimulationStore,
    SubscriptionId,
};
pub use ticker::TelemetryTicker;
pub use tool_call::{SectionId, SimulationEvent, ToolCall, ToolCallError};
