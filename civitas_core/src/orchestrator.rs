//! Inference Orchestrator - routes chat requests to a model tier.
//!
//! # Request Flow
//!
//! ```text
//! chat(message, is_boosted)
//!   │
//!   ├─ select tier ── boosted → reasoning model, else fast model
//!   │
//!   ├─ cache.get(key) ── hit → cached = true, latency = lookup time
//!   │
//!   └─ model.generate() ── latency measured on the session clock
//!        ├─ cost = CostEstimator::estimate(text, tier)
//!        └─ cache.put() unless the answer carries tool calls
//! ```
//!
//! # Cache Policy
//!
//! `CachePolicy::PartitionByTier` (default) keeps both tiers in the cache
//! under keys that embed the tier and the model id. `CachePolicy::BypassWhenBoosted`
//! sends every boosted request to the model and never caches its answer.
//! Either way a boosted answer is never served for a non-boosted request.
//!
//! # Concurrency
//!
//! Concurrent misses on the same key both reach the model and both write
//! the cache; the last write wins. There is no in-flight request collapsing.

use crate::cache::{CacheEntry, CacheKey, ResponseCache};
use crate::config::OrchestratorConfig;
use crate::cost::CostEstimator;
use crate::error::OrchestratorError;
use crate::tool_call::tool_schema;
use civitas_env::{GenerateRequest, GenerativeModel, RawToolCall, SessionContext, ToolDeclaration};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Share of total latency reported as time-to-first-token.
///
/// There is no streaming token timer; TTFT is an estimate, not a measurement.
pub const TTFT_FRACTION: f64 = 0.35;

/// Latency telemetry attached to every chat response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceMetrics {
    /// Estimated time-to-first-token (ms)
    pub ttft_ms: f64,

    /// Wall-clock time of the request (ms)
    pub total_latency_ms: f64,

    /// Served from the response cache
    pub cached: bool,

    /// Served by the boosted reasoning tier
    pub accelerated: bool,
}

impl InferenceMetrics {
    /// Metrics for a fresh generation.
    pub fn measured(total_latency_ms: f64, accelerated: bool) -> Self {
        Self {
            ttft_ms: total_latency_ms * TTFT_FRACTION,
            total_latency_ms,
            cached: false,
            accelerated,
        }
    }

    /// Metrics for a cache hit; `lookup_ms` replaces the original latency.
    pub fn cached(lookup_ms: f64, accelerated: bool) -> Self {
        Self {
            ttft_ms: lookup_ms * TTFT_FRACTION,
            total_latency_ms: lookup_ms,
            cached: true,
            accelerated,
        }
    }
}

/// Normalized result envelope of `chat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub request_id: Uuid,
    pub text: String,
    pub metrics: InferenceMetrics,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<RawToolCall>,

    pub cost_estimate: f64,

    /// Model id of the tier that answered
    pub model_id: String,
}

fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// Routes chat requests through the cache and the remote model.
pub struct InferenceOrchestrator<Ctx, M>
where
    Ctx: SessionContext,
    M: GenerativeModel,
{
    context: Arc<Ctx>,
    model: Arc<M>,
    cache: Arc<ResponseCache<Ctx>>,
    estimator: CostEstimator,
    config: OrchestratorConfig,

    /// Closed tool schema, built once
    tools: Vec<ToolDeclaration>,
}

impl<Ctx, M> InferenceOrchestrator<Ctx, M>
where
    Ctx: SessionContext,
    M: GenerativeModel,
{
    /// Creates an orchestrator.
    ///
    /// # Errors
    /// `UnknownTier` if either configured model has no cost coefficient.
    pub fn new(
        context: Arc<Ctx>,
        model: Arc<M>,
        cache: Arc<ResponseCache<Ctx>>,
        estimator: CostEstimator,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        for model_id in [&config.fast_model, &config.reasoning_model] {
            if !estimator.knows(model_id) {
                return Err(OrchestratorError::UnknownTier(model_id.clone()));
            }
        }

        Ok(Self {
            context,
            model,
            cache,
            estimator,
            config,
            tools: tool_schema(),
        })
    }

    /// Model id serving a request with the given boost flag.
    pub fn select_tier(&self, is_boosted: bool) -> &str {
        if is_boosted {
            &self.config.reasoning_model
        } else {
            &self.config.fast_model
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache<Ctx>> {
        &self.cache
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Answers one chat message.
    pub async fn chat(&self, message: &str, is_boosted: bool) -> Result<ChatResponse, OrchestratorError> {
        let request_id = Uuid::new_v4();
        let model_id = self.select_tier(is_boosted).to_string();
        let span = info_span!("chat", %request_id, model = %model_id, boosted = is_boosted);

        self.chat_on_tier(request_id, model_id, message, is_boosted)
            .instrument(span)
            .await
    }

    async fn chat_on_tier(
        &self,
        request_id: Uuid,
        model_id: String,
        message: &str,
        is_boosted: bool,
    ) -> Result<ChatResponse, OrchestratorError> {
        let use_cache = self.config.cache_policy.uses_cache(is_boosted);
        let key = CacheKey::derive(message, &model_id, is_boosted);

        if use_cache {
            let lookup_started = self.context.now();
            if let Some(entry) = self.cache.get(&key) {
                let lookup = self.context.now().saturating_sub(lookup_started);
                debug!(key = %key, "cache hit");
                return Ok(ChatResponse {
                    request_id,
                    text: entry.text,
                    metrics: InferenceMetrics::cached(as_millis_f64(lookup), is_boosted),
                    tool_calls: Vec::new(),
                    cost_estimate: entry.cost_estimate,
                    model_id,
                });
            }
            debug!(key = %key, "cache miss");
        }

        let request = GenerateRequest::new(model_id.clone(), message)
            .with_system_instruction(self.config.system_instruction.clone())
            .with_tools(self.tools.clone());

        let started = self.context.now();
        let response = match self.model.generate(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(backend = self.model.backend_name(), error = %err, "generation failed");
                return Err(err.into());
            }
        };
        let total = self.context.now().saturating_sub(started);

        let metrics = InferenceMetrics::measured(as_millis_f64(total), is_boosted);
        let cost_estimate = self.estimator.estimate(&response.text, &model_id)?;

        if use_cache && !response.has_tool_calls() {
            self.cache.put(
                key,
                CacheEntry {
                    text: response.text.clone(),
                    metrics,
                    cost_estimate,
                    created_at: self.context.now(),
                },
            );
        }

        info!(
            latency_ms = metrics.total_latency_ms,
            cost = cost_estimate,
            tool_calls = response.tool_calls.len(),
            "generation complete"
        );

        Ok(ChatResponse {
            request_id,
            text: response.text,
            metrics,
            tool_calls: response.tool_calls,
            cost_estimate,
            model_id,
        })
    }
}
