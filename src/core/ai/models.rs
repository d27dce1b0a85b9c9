use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sampling settings forwarded to the model provider on every call.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub reasoning_enabled: Option<bool>,
    pub reasoning_effort: Option<String>,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.7,
            max_tokens: None,
            top_p: Some(1.0),
            reasoning_enabled: None,
            reasoning_effort: None,
        }
    }
}

// =============================================================================
// TOOL DESCRIPTORS
// =============================================================================
//
// The shape the model sees for every callable tool:
// `{name, description, parameters: {type: "object", properties, required}}`.

/// Schema for a single tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyDef {
    /// JSON Schema type: "string", "number", "integer", "boolean", "array", "object"
    #[serde(rename = "type")]
    pub prop_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Allowed values (string parameters only).
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,

    /// Element schema for array parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertyDef>>,
}

impl PropertyDef {
    pub fn new(prop_type: &str, description: &str) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: Some(description.to_string()),
            enum_values: None,
            items: None,
        }
    }

    pub fn string(description: &str) -> Self {
        Self::new("string", description)
    }

    pub fn number(description: &str) -> Self {
        Self::new("number", description)
    }

    pub fn boolean(description: &str) -> Self {
        Self::new("boolean", description)
    }

    pub fn string_enum(description: &str, values: &[&str]) -> Self {
        Self {
            enum_values: Some(values.iter().map(|v| v.to_string()).collect()),
            ..Self::string(description)
        }
    }

    pub fn string_list(description: &str) -> Self {
        Self {
            items: Some(Box::new(PropertyDef {
                prop_type: "string".to_string(),
                description: None,
                enum_values: None,
                items: None,
            })),
            ..Self::new("array", description)
        }
    }
}

/// The `parameters` object of a tool descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionParameters {
    /// Always "object".
    #[serde(rename = "type")]
    pub param_type: String,

    /// Ordered by parameter name so the descriptor set is stable between turns.
    pub properties: BTreeMap<String, PropertyDef>,

    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for FunctionParameters {
    fn default() -> Self {
        Self {
            param_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

/// A named, schema-described operation the model may ask us to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: FunctionParameters,
}

impl ToolDescriptor {
    /// Starts a descriptor with no parameters.
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: FunctionParameters::default(),
        }
    }

    /// Adds a required parameter.
    pub fn param(mut self, name: &str, def: PropertyDef) -> Self {
        self.parameters.properties.insert(name.to_string(), def);
        self.parameters.required.push(name.to_string());
        self
    }

    /// Adds an optional parameter.
    pub fn optional(mut self, name: &str, def: PropertyDef) -> Self {
        self.parameters.properties.insert(name.to_string(), def);
        self
    }
}

// =============================================================================
// TOOL INVOCATIONS
// =============================================================================

/// A tool invocation requested by the model. Arguments are passed through
/// untouched as a single mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: &str, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.to_string(),
            args,
        }
    }
}

/// Uniform result envelope returned by every tool handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            error: None,
        }
    }

    /// A failure carrying the underlying provider error next to the
    /// user-facing message.
    pub fn failed_with(message: impl Into<String>, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::failure(message)
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| {
            serde_json::json!({ "success": self.success, "message": self.message })
        })
    }
}

/// A tool result paired with the name of the tool that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub name: String,
    pub result: ToolResult,
}

// =============================================================================
// CONVERSATION TURNS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Model,
    ToolResult,
}

/// One entry of a user's conversation, replayed to the model in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum ConversationTurn {
    User(String),
    ModelText(String),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<ToolOutput>),
}

impl ConversationTurn {
    pub fn role(&self) -> TurnRole {
        match self {
            ConversationTurn::User(_) => TurnRole::User,
            ConversationTurn::ModelText(_) | ConversationTurn::ToolCalls(_) => TurnRole::Model,
            ConversationTurn::ToolResults(_) => TurnRole::ToolResult,
        }
    }
}

/// What the model sent back for one request: either text or a batch of
/// tool calls (Gemini may include a little text next to calls).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelReply {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    /// Thought summary when the model has thinking enabled.
    pub thinking: Option<String>,
}

impl ModelReply {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The turn recorded in history for this reply.
    pub fn as_turn(&self) -> ConversationTurn {
        if self.has_tool_calls() {
            ConversationTurn::ToolCalls(self.tool_calls.clone())
        } else {
            ConversationTurn::ModelText(self.text.clone())
        }
    }
}

// =============================================================================
// TURN OUTCOME
// =============================================================================

/// Why the tool loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// The model answered with text.
    FinalText,
    /// The model still wanted tools after the ceiling was reached.
    IterationCeilingHit,
    /// The model or the store failed; the turn was abandoned.
    UpstreamError,
    /// The whole turn exceeded its time budget.
    TurnTimeout,
}

/// Result of one user turn. `message` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnOutcome {
    pub success: bool,
    pub message: String,
    pub exit: LoopExit,
    pub tool_iterations: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_descriptor_serializes_in_model_shape() {
        let descriptor = ToolDescriptor::new("share_file", "Share a file.")
            .param("fileId", PropertyDef::string("File to share"))
            .optional(
                "role",
                PropertyDef::string_enum("Permission level", &["reader", "writer"]),
            );

        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["parameters"]["type"], "object");
        assert_eq!(json["parameters"]["required"], json!(["fileId"]));
        assert_eq!(
            json["parameters"]["properties"]["role"]["enum"],
            json!(["reader", "writer"])
        );
        // items is skipped for non-array parameters
        assert!(json["parameters"]["properties"]["fileId"].get("items").is_none());
    }

    #[test]
    fn test_tool_call_ignores_non_object_args() {
        let call = ToolCall::new("list_linear_teams", json!(null));
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_tool_result_json_skips_empty_fields() {
        let json = ToolResult::failure("nope").to_json();
        assert_eq!(json, json!({ "success": false, "message": "nope" }));
    }

    #[test]
    fn test_reply_turn_prefers_tool_calls() {
        let reply = ModelReply {
            text: "Let me check".to_string(),
            tool_calls: vec![ToolCall::new("list_google_docs", json!({}))],
            thinking: None,
        };
        assert_eq!(reply.as_turn().role(), TurnRole::Model);
        assert!(matches!(reply.as_turn(), ConversationTurn::ToolCalls(_)));
    }
}
