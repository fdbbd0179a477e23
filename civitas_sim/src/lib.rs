//! Civitas Deterministic Simulation Harness
//!
//! Runs complete operator sessions (chat, cache, tool calls, telemetry)
//! against a scripted model on a virtual clock, so every run is a pure
//! function of its seed.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        SimSession                         │
//! │  SimContext (virtual clock, seeded RNG streams)           │
//! │       │                                                   │
//! │  ┌────▼──────────────┐   tool calls   ┌────────────────┐  │
//! │  │ Orchestrator      │ ─────────────► │ SimulationStore│  │
//! │  │  + ScriptedModel  │   Dispatcher   │                │  │
//! │  └───────────────────┘                └────────────────┘  │
//! └───────────────────────────────────────────────────────────┘
//!           ▲                                    │
//!     ScenarioRunner ──────── frames ─────► SimExport (JSON)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use civitas_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::OrderedDispatch).await;
//! assert!(result.passed);
//! ```

mod context;
mod exporter;
mod model;
mod runner;
mod session;
pub mod scenarios;

pub use context::SimContext;
pub use exporter::{SimEvent, SimExport, SimFrame};
pub use model::{ScriptRule, ScriptedModel};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
pub use session::{RecordingNavigator, SimSession, Turn, FAST_LATENCY, REASONING_LATENCY};
