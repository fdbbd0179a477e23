//! Generative model abstraction for the inference orchestrator.

use async_trait::async_trait;
use crate::error::ModelError;
use crate::types::{GenerateRequest, GenerateResponse};

/// Abstraction over the remote generative model.
///
/// # Implementations
///
/// - **Production**: an HTTP client for the hosted model (lives outside this workspace)
/// - **Simulation**: `ScriptedModel` with canned answers and injectable faults
///
/// # Call Flow
///
/// ```text
/// Orchestrator                 Model
///   |                            |
///   |-- generate(request) ------>|
///   |                            |-- [latency] --+
///   |<-------- text, tool calls -|<--------------+
/// ```
#[async_trait]
pub trait GenerativeModel: Send + Sync + 'static {
    /// Runs one generation.
    ///
    /// # Returns
    /// * `Ok(response)` - Text plus zero or more tool calls
    /// * `Err(ModelError::RateLimited)` - The backend is saturated (HTTP 429)
    /// * `Err(_)` - Any other transport or model failure
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ModelError>;

    /// Human-readable backend name for logs.
    fn backend_name(&self) -> &str;
}
