//! Closed set of tool calls the model may issue, and their wire schema.
//!
//! The model returns `RawToolCall { name, args }`. `ToolCall::parse` turns
//! that into a closed enum so the dispatcher can match exhaustively; a new
//! tool is a compile-time-checked change.

use crate::simulation::{DistrictId, RoutingBackbone};
use civitas_env::{RawToolCall, ToolDeclaration};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

/// Wire name of the navigation tool.
pub const NAVIGATE_TO_SECTION: &str = "navigateToSection";

/// Wire name of the simulation-event tool.
pub const TRIGGER_SIMULATION_EVENT: &str = "triggerSimulationEvent";

/// Wire name of the GPU boost tool.
pub const TOGGLE_GPU_BOOST: &str = "toggleGpuBoost";

/// System instruction sent with every generation.
pub const SYSTEM_INSTRUCTION: &str = "You are the operations copilot of the Civitas federated platform. \
Answer questions about the platform's districts, routing backbone and inference tiers concisely. \
When the user asks to see a part of the dashboard, call navigateToSection. \
When the user asks to fail a district, switch the transit backbone or reset the simulation, call triggerSimulationEvent. \
When the user asks to toggle GPU acceleration on the Forge compute district, call toggleGpuBoost. \
Never invent district identifiers.";

/// Navigable dashboard sections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionId {
    Overview,
    Architecture,
    Districts,
    Simulation,
    Inference,
    Roadmap,
}

impl SectionId {
    pub const ALL: [SectionId; 6] = [
        SectionId::Overview,
        SectionId::Architecture,
        SectionId::Districts,
        SectionId::Simulation,
        SectionId::Inference,
        SectionId::Roadmap,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            SectionId::Overview => "overview",
            SectionId::Architecture => "architecture",
            SectionId::Districts => "districts",
            SectionId::Simulation => "simulation",
            SectionId::Inference => "inference",
            SectionId::Roadmap => "roadmap",
        }
    }
}

impl std::fmt::Display for SectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for SectionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        SectionId::ALL
            .into_iter()
            .find(|section| section.name() == wanted)
            .ok_or_else(|| format!("Unknown section: {}", s))
    }
}

/// Mutation requested through `triggerSimulationEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulationEvent {
    /// `FAIL_DISTRICT`: take a district offline
    FailDistrict(DistrictId),

    /// `SWITCH_TRANSIT`: select a backbone, or flip to the alternate
    SwitchTransit(Option<RoutingBackbone>),

    /// `RESET`
    Reset,
}

/// An interpreted tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCall {
    Navigate { section: SectionId },
    SimulationEvent(SimulationEvent),
    ToggleGpuBoost,
}

/// Why a raw tool call could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolCallError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    InvalidArgs { tool: String, reason: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NavigateArgs {
    section_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulationEventArgs {
    event_type: String,
    #[serde(default)]
    target_id: Option<String>,
}

fn invalid(tool: &str, reason: impl Into<String>) -> ToolCallError {
    ToolCallError::InvalidArgs {
        tool: tool.to_string(),
        reason: reason.into(),
    }
}

impl ToolCall {
    /// Interprets a raw tool call.
    pub fn parse(raw: &RawToolCall) -> Result<Self, ToolCallError> {
        match raw.name.as_str() {
            NAVIGATE_TO_SECTION => {
                let args: NavigateArgs = serde_json::from_value(raw.args.clone())
                    .map_err(|e| invalid(NAVIGATE_TO_SECTION, e.to_string()))?;
                let section = args
                    .section_id
                    .parse()
                    .map_err(|e: String| invalid(NAVIGATE_TO_SECTION, e))?;
                Ok(ToolCall::Navigate { section })
            }
            TRIGGER_SIMULATION_EVENT => {
                let args: SimulationEventArgs = serde_json::from_value(raw.args.clone())
                    .map_err(|e| invalid(TRIGGER_SIMULATION_EVENT, e.to_string()))?;
                let event = match args.event_type.to_uppercase().as_str() {
                    "FAIL_DISTRICT" => {
                        let target = args
                            .target_id
                            .ok_or_else(|| invalid(TRIGGER_SIMULATION_EVENT, "FAIL_DISTRICT needs targetId"))?;
                        let id = target
                            .parse()
                            .map_err(|e: String| invalid(TRIGGER_SIMULATION_EVENT, e))?;
                        SimulationEvent::FailDistrict(id)
                    }
                    "SWITCH_TRANSIT" => {
                        let backbone = args
                            .target_id
                            .map(|t| t.parse::<RoutingBackbone>())
                            .transpose()
                            .map_err(|e: String| invalid(TRIGGER_SIMULATION_EVENT, e))?;
                        SimulationEvent::SwitchTransit(backbone)
                    }
                    "RESET" => SimulationEvent::Reset,
                    other => {
                        return Err(invalid(
                            TRIGGER_SIMULATION_EVENT,
                            format!("unknown eventType {}", other),
                        ))
                    }
                };
                Ok(ToolCall::SimulationEvent(event))
            }
            TOGGLE_GPU_BOOST => Ok(ToolCall::ToggleGpuBoost),
            other => Err(ToolCallError::UnknownTool(other.to_string())),
        }
    }

    /// Wire name of this call.
    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::Navigate { .. } => NAVIGATE_TO_SECTION,
            ToolCall::SimulationEvent(_) => TRIGGER_SIMULATION_EVENT,
            ToolCall::ToggleGpuBoost => TOGGLE_GPU_BOOST,
        }
    }
}

/// The closed tool schema sent with every generation.
pub fn tool_schema() -> Vec<ToolDeclaration> {
    let sections: Vec<&str> = SectionId::ALL.iter().map(|s| s.name()).collect();
    let targets: Vec<&str> = DistrictId::ALL
        .iter()
        .map(|d| d.name())
        .chain(RoutingBackbone::ALL.iter().map(|b| b.name()))
        .collect();

    vec![
        ToolDeclaration {
            name: NAVIGATE_TO_SECTION.to_string(),
            description: "Scroll the dashboard to a section.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "sectionId": { "type": "string", "enum": sections }
                },
                "required": ["sectionId"]
            }),
        },
        ToolDeclaration {
            name: TRIGGER_SIMULATION_EVENT.to_string(),
            description: "Fail a district, switch the transit backbone, or reset the simulation."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "eventType": {
                        "type": "string",
                        "enum": ["FAIL_DISTRICT", "SWITCH_TRANSIT", "RESET"]
                    },
                    "targetId": {
                        "type": "string",
                        "description": "District id for FAIL_DISTRICT, backbone for SWITCH_TRANSIT",
                        "enum": targets
                    }
                },
                "required": ["eventType"]
            }),
        },
        ToolDeclaration {
            name: TOGGLE_GPU_BOOST.to_string(),
            description: "Toggle GPU acceleration on the Forge compute district.".to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, args: serde_json::Value) -> RawToolCall {
        RawToolCall::new(name, args)
    }

    #[test]
    fn test_parse_navigate() {
        let call = ToolCall::parse(&raw(NAVIGATE_TO_SECTION, json!({"sectionId": "Roadmap"}))).unwrap();
        assert_eq!(call, ToolCall::Navigate { section: SectionId::Roadmap });
    }

    #[test]
    fn test_parse_simulation_events() {
        let fail = ToolCall::parse(&raw(
            TRIGGER_SIMULATION_EVENT,
            json!({"eventType": "FAIL_DISTRICT", "targetId": "harbor"}),
        ))
        .unwrap();
        assert_eq!(
            fail,
            ToolCall::SimulationEvent(SimulationEvent::FailDistrict(DistrictId::Harbor))
        );

        let switch = ToolCall::parse(&raw(
            TRIGGER_SIMULATION_EVENT,
            json!({"eventType": "SWITCH_TRANSIT", "targetId": "secondary"}),
        ))
        .unwrap();
        assert_eq!(
            switch,
            ToolCall::SimulationEvent(SimulationEvent::SwitchTransit(Some(RoutingBackbone::Secondary)))
        );

        let flip = ToolCall::parse(&raw(TRIGGER_SIMULATION_EVENT, json!({"eventType": "SWITCH_TRANSIT"}))).unwrap();
        assert_eq!(flip, ToolCall::SimulationEvent(SimulationEvent::SwitchTransit(None)));

        let reset = ToolCall::parse(&raw(TRIGGER_SIMULATION_EVENT, json!({"eventType": "RESET"}))).unwrap();
        assert_eq!(reset, ToolCall::SimulationEvent(SimulationEvent::Reset));
    }

    #[test]
    fn test_parse_toggle_ignores_args() {
        assert_eq!(
            ToolCall::parse(&raw(TOGGLE_GPU_BOOST, serde_json::Value::Null)).unwrap(),
            ToolCall::ToggleGpuBoost
        );
    }

    #[test]
    fn test_parse_rejects_unknown_and_malformed() {
        assert_eq!(
            ToolCall::parse(&raw("launchMissiles", json!({}))).unwrap_err(),
            ToolCallError::UnknownTool("launchMissiles".to_string())
        );
        assert!(matches!(
            ToolCall::parse(&raw(TRIGGER_SIMULATION_EVENT, json!({"eventType": "FAIL_DISTRICT"}))),
            Err(ToolCallError::InvalidArgs { .. })
        ));
        assert!(matches!(
            ToolCall::parse(&raw(TRIGGER_SIMULATION_EVENT, json!({"eventType": "FAIL_DISTRICT", "targetId": "atlantis"}))),
            Err(ToolCallError::InvalidArgs { .. })
        ));
        assert!(matches!(
            ToolCall::parse(&raw(NAVIGATE_TO_SECTION, json!({}))),
            Err(ToolCallError::InvalidArgs { .. })
        ));
    }

    #[test]
    fn test_schema_names_match_parser() {
        let schema = tool_schema();
        let names: Vec<&str> = schema.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![NAVIGATE_TO_SECTION, TRIGGER_SIMULATION_EVENT, TOGGLE_GPU_BOOST]);
        let districts = &schema[1].parameters["properties"]["targetId"]["enum"];
        assert_eq!(districts.as_array().unwrap().len(), DistrictId::ALL.len() + 3);
    }
}
