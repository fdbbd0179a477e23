//! Civitas Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" abstraction allowing the Civitas
//! inference and simulation core to run in both **Production** (tokio) and
//! **Simulation** (virtual clock) environments.
//!
//! # Core Concept: Intercept Everything Non-Deterministic
//!
//! - Time (`now()`, `sleep()`)
//! - Background work (`spawn()`)
//! - Randomness (`derive_rng()`)
//! - The remote generative model (`GenerativeModel::generate()`)
//!
//! By deriving all entropy from a single 64-bit seed and routing every
//! model call through a trait, any session becomes reproducible from its
//! seed number and a scripted model.
//!
//! # Example
//!
//! ```ignore
//! use civitas_env::{SessionContext, GenerativeModel};
//!
//! async fn telemetry_loop<Ctx: SessionContext>(ctx: &Ctx) {
//!     loop {
//!         ctx.sleep(Duration::from_secs(2)).await;
//!         tick();
//!     }
//! }
//! ```

mod context;
mod model;
mod types;
mod error;
mod tokio_impl;

pub use context::SessionContext;
pub use model::GenerativeModel;
pub use types::{GenerateRequest, GenerateResponse, RawToolCall, ToolDeclaration};
pub use error::ModelError;
pub use tokio_impl::TokioContext;
