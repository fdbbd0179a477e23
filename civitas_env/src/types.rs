//! Common wire types exchanged with the generative model.

use serde::{Deserialize, Serialize};

/// A tool the model may ask the host to invoke.
///
/// `parameters` is a JSON-schema object; the model validates its own
/// output against it before returning a tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// One generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier of the selected tier
    pub model_id: String,

    /// Fixed system instruction prepended by the orchestrator
    pub system_instruction: String,

    /// The user's message, unmodified
    pub prompt: String,

    /// Closed tool schema the model may call into
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,
}

impl GenerateRequest {
    /// Creates a request without tools.
    pub fn new(model_id: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            system_instruction: String::new(),
            prompt: prompt.into(),
            tools: Vec::new(),
        }
    }

    /// Sets the system instruction.
    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    /// Sets the tool schema.
    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.tools = tools;
        self
    }
}

/// A tool call as returned by the model, before interpretation.
///
/// The name is free-form on the wire; the core maps it onto a closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToolCall {
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl RawToolCall {
    /// Creates a raw tool call.
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// The model's answer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<RawToolCall>,
}

impl GenerateResponse {
    /// Creates a text-only response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Returns true if the model asked for any action.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_tool_call_args_default_to_null() {
        let call: RawToolCall = serde_json::from_str(r#"{"name":"toggleGpuBoost"}"#).unwrap();
        assert_eq!(call.name, "toggleGpuBoost");
        assert!(call.args.is_null());
    }

    #[test]
    fn test_response_without_tool_calls() {
        let resp: GenerateResponse = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert!(!resp.has_tool_calls());
        assert_eq!(resp, GenerateResponse::text("hi"));
    }
}
