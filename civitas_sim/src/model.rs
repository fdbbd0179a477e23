//! Scripted generative model with fault injection.
//!
//! Stands in for the hosted model: answers come from a small rule set over
//! the prompt, latency is charged to the session clock, and failures can be
//! queued ahead of time.

use async_trait::async_trait;
use civitas_core::tool_call::{NAVIGATE_TO_SECTION, TOGGLE_GPU_BOOST, TRIGGER_SIMULATION_EVENT};
use civitas_core::{DistrictId, RoutingBackbone, SectionId};
use civitas_env::{GenerateRequest, GenerateResponse, GenerativeModel, ModelError, RawToolCall, SessionContext};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

/// A rule: if the normalized prompt contains `trigger`, answer with `response`.
#[derive(Debug, Clone)]
pub struct ScriptRule {
    pub trigger: String,
    pub response: GenerateResponse,
}

/// Deterministic `GenerativeModel` for simulation and demos.
pub struct ScriptedModel<Ctx: SessionContext> {
    context: Arc<Ctx>,

    /// Latency per model id
    latencies: HashMap<String, Duration>,

    /// Latency for model ids not in `latencies`
    default_latency: Duration,

    /// Checked before the built-in operator script
    rules: Vec<ScriptRule>,

    /// Failures returned by the next calls, oldest first
    pending_failures: Mutex<VecDeque<ModelError>>,

    calls: AtomicU64,
}

impl<Ctx: SessionContext> ScriptedModel<Ctx> {
    /// Creates a model that charges `default_latency` per call.
    pub fn new(context: Arc<Ctx>, default_latency: Duration) -> Self {
        Self {
            context,
            latencies: HashMap::new(),
            default_latency,
            rules: Vec::new(),
            pending_failures: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
        }
    }

    /// Sets the latency charged for `model_id`.
    pub fn with_latency(mut self, model_id: impl Into<String>, latency: Duration) -> Self {
        self.latencies.insert(model_id.into(), latency);
        self
    }

    /// Adds a custom rule.
    pub fn with_rule(mut self, trigger: impl Into<String>, response: GenerateResponse) -> Self {
        self.rules.push(ScriptRule {
            trigger: trigger.into().to_lowercase(),
            response,
        });
        self
    }

    /// Queues a failure for the next call.
    pub fn fail_next(&self, error: ModelError) {
        self.pending_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(error);
    }

    /// Number of `generate` calls so far, failed ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn latency_for(&self, model_id: &str) -> Duration {
        self.latencies
            .get(model_id)
            .copied()
            .unwrap_or(self.default_latency)
    }

    fn respond(&self, request: &GenerateRequest) -> GenerateResponse {
        let prompt = request.prompt.to_lowercase();

        if let Some(rule) = self.rules.iter().find(|r| prompt.contains(&r.trigger)) {
            return rule.response.clone();
        }

        operator_script(&prompt, &request.model_id)
    }
}

fn mentioned<T: Copy>(prompt: &str, candidates: &[T], name: impl Fn(&T) -> &'static str) -> Option<T> {
    prompt
        .split(|c: char| !c.is_alphanumeric())
        .find_map(|word| candidates.iter().copied().find(|c| name(c) == word))
}

/// Built-in answers for the demo dashboard's operator chat.
fn operator_script(prompt: &str, model_id: &str) -> GenerateResponse {
    let district = mentioned(prompt, &DistrictId::ALL, |d| d.name());
    let backbone = mentioned(prompt, &RoutingBackbone::ALL, |b| b.name());
    let section = mentioned(prompt, &SectionId::ALL, |s| s.name());

    let call = |name: &str, args: serde_json::Value| vec![RawToolCall::new(name, args)];

    if prompt.contains("reset") {
        return GenerateResponse {
            text: "Resetting the simulation to its baseline.".into(),
            tool_calls: call(TRIGGER_SIMULATION_EVENT, json!({ "eventType": "RESET" })),
        };
    }
    if prompt.contains("fail") || prompt.contains("take down") {
        if let Some(id) = district {
            return GenerateResponse {
                text: format!("Simulating an outage in {}.", id),
                tool_calls: call(
                    TRIGGER_SIMULATION_EVENT,
                    json!({ "eventType": "FAIL_DISTRICT", "targetId": id.name() }),
                ),
            };
        }
    }
    if prompt.contains("transit") || prompt.contains("backbone") {
        let args = match backbone {
            Some(b) => json!({ "eventType": "SWITCH_TRANSIT", "targetId": b.name() }),
            None => json!({ "eventType": "SWITCH_TRANSIT" }),
        };
        return GenerateResponse {
            text: "Rerouting inter-district traffic.".into(),
            tool_calls: call(TRIGGER_SIMULATION_EVENT, args),
        };
    }
    if prompt.contains("boost") || prompt.contains("gpu") {
        return GenerateResponse {
            text: "Toggling GPU acceleration on the Forge.".into(),
            tool_calls: call(TOGGLE_GPU_BOOST, json!({})),
        };
    }
    if prompt.contains("show") || prompt.contains("go to") {
        if let Some(section) = section {
            return GenerateResponse {
                text: format!("Opening the {} section.", section),
                tool_calls: call(NAVIGATE_TO_SECTION, json!({ "sectionId": section.name() })),
            };
        }
    }

    let text = match district {
        Some(id) => format!(
            "[{}] The {} district is one of seven federated hubs; it reports load and health every tick.",
            model_id, id
        ),
        None => format!(
            "[{}] Civitas federates seven districts over a switchable routing backbone. Ask me to fail a district, switch transit or boost the Forge.",
            model_id
        ),
    };
    GenerateResponse::text(text)
}

#[async_trait]
impl<Ctx: SessionContext> GenerativeModel for ScriptedModel<Ctx> {
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let latency = self.latency_for(&request.model_id);
        self.context.sleep(latency).await;

        let failure = self
            .pending_failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        if let Some(error) = failure {
            debug!(model = %request.model_id, error = %error, "scripted failure");
            return Err(error);
        }

        Ok(self.respond(&request))
    }

    fn backend_name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SimContext;
    use civitas_core::ToolCall;
    use civitas_core::SimulationEvent;

    fn model() -> (Arc<SimContext>, ScriptedModel<SimContext>) {
        let ctx = SimContext::shared(1);
        let model = ScriptedModel::new(ctx.clone(), Duration::from_millis(400))
            .with_latency("slow", Duration::from_secs(2));
        (ctx, model)
    }

    fn parsed(response: &GenerateResponse) -> Vec<ToolCall> {
        response
            .tool_calls
            .iter()
            .map(|raw| ToolCall::parse(raw).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_latency_advances_virtual_clock() {
        let (ctx, model) = model();
        model.generate(GenerateRequest::new("fast", "hello")).await.unwrap();
        assert_eq!(ctx.now(), Duration::from_millis(400));
        model.generate(GenerateRequest::new("slow", "hello")).await.unwrap();
        assert_eq!(ctx.now(), Duration::from_millis(2400));
        assert_eq!(model.calls(), 2);
    }

    #[tokio::test]
    async fn test_operator_script_emits_valid_tool_calls() {
        let (_, model) = model();

        let fail = model.generate(GenerateRequest::new("m", "Please fail the Harbor district")).await.unwrap();
        assert_eq!(
            parsed(&fail),
            vec![ToolCall::SimulationEvent(SimulationEvent::FailDistrict(DistrictId::Harbor))]
        );

        let switch = model.generate(GenerateRequest::new("m", "switch transit to secondary")).await.unwrap();
        assert_eq!(
            parsed(&switch),
            vec![ToolCall::SimulationEvent(SimulationEvent::SwitchTransit(Some(RoutingBackbone::Secondary)))]
        );

        let boost = model.generate(GenerateRequest::new("m", "boost the GPUs")).await.unwrap();
        assert_eq!(parsed(&boost), vec![ToolCall::ToggleGpuBoost]);

        let nav = model.generate(GenerateRequest::new("m", "show me the roadmap")).await.unwrap();
        assert_eq!(parsed(&nav), vec![ToolCall::Navigate { section: SectionId::Roadmap }]);

        let info = model.generate(GenerateRequest::new("m", "what is civitas?")).await.unwrap();
        assert!(info.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn test_queued_failures_come_first() {
        let (_, model) = model();
        model.fail_next(ModelError::rate_limited("429"));

        assert!(model.generate(GenerateRequest::new("m", "hi")).await.unwrap_err().is_rate_limit());
        assert!(model.generate(GenerateRequest::new("m", "hi")).await.is_ok());
    }

    #[tokio::test]
    async fn test_custom_rule_wins() {
        let ctx = SimContext::shared(1);
        let model = ScriptedModel::new(ctx, Duration::ZERO)
            .with_rule("Reset", GenerateResponse::text("no tools for you"));
        let resp = model.generate(GenerateRequest::new("m", "reset everything")).await.unwrap();
        assert_eq!(resp, GenerateResponse::text("no tools for you"));
    }
}
