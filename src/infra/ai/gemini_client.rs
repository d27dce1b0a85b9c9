// =============================================================================
// GEMINI CLIENT - Google AI Studio API Integration
// =============================================================================
//
// Implements `AiProvider` against Google's Gemini API
// (https://ai.google.dev/gemini-api/docs) with function calling.
//
// **Request format:**
// - Authentication: API key in the `x-goog-api-key` header.
// - `systemInstruction` is a separate top-level field.
// - Conversation turns become `contents[]`, each with a `parts` array.
// - Tool descriptors become one tool holding `functionDeclarations`.
//
// **Turn mapping:**
// - user text      -> role "user",  `text` part
// - model text     -> role "model", `text` part
// - tool calls     -> role "model", one `functionCall` part per call
// - tool results   -> role "user",  one `functionResponse` part per result
//
// **Environment Variables:**
// - `GEMINI_API_KEY` - Your API key from https://aistudio.google.com/apikey

use crate::core::ai::{
    AiConfig, AiError, AiProvider, ConversationTurn, ModelReply, ModelRequest, PropertyDef,
    ToolCall, ToolDescriptor, TurnRole,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

// =============================================================================
// GEMINI API DATA STRUCTURES
// =============================================================================
//
// See: https://ai.google.dev/api/generate-content

/// A single part of content. Gemini uses a "parts" array to carry text,
/// function calls and function responses.
#[derive(Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,

    /// Set on thought-summary parts when thinking is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    thought: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<GeminiFunctionCall>,

    #[serde(skip_serializing_if = "Option::is_none")]
    function_response: Option<GeminiFunctionResponse>,
}

/// Function call requested by the model.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct GeminiFunctionCall {
    name: String,

    /// Omitted by the API for functions without parameters.
    #[serde(default)]
    args: serde_json::Value,
}

/// Result of a function execution sent back to the model.
#[derive(Debug, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    /// "user" or "model"
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

/// See: https://ai.google.dev/api/generate-content#generationconfig
#[derive(Debug, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,

    /// Thinking/reasoning settings (Gemini 2.5+ only).
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ThinkingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    include_thoughts: Option<bool>,

    /// 0 disables thinking, -1 lets the model decide.
    #[serde(skip_serializing_if = "Option::is_none")]
    thinking_budget: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<GeminiFunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionDeclaration {
    name: String,
    description: String,

    /// Omitted for functions without parameters; Gemini rejects an empty
    /// `properties` object.
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<GeminiFunctionParameters>,
}

#[derive(Debug, Serialize)]
struct GeminiFunctionParameters {
    #[serde(rename = "type")]
    param_type: String,
    properties: BTreeMap<String, GeminiPropertySchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    required: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct GeminiPropertySchema {
    #[serde(rename = "type")]
    prop_type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    enum_values: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    items: Option<Box<GeminiPropertySchema>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiToolConfig {
    function_calling_config: FunctionCallingConfig,
}

#[derive(Debug, Serialize)]
struct FunctionCallingConfig {
    /// "AUTO": the model decides whether to call functions.
    mode: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tool_config: Option<GeminiToolConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,

    /// Why the model stopped generating (e.g., "STOP", "SAFETY").
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorDetail,
}

// =============================================================================
// GEMINI CLIENT IMPLEMENTATION
// =============================================================================

/// Client for Google's Gemini API.
///
/// # Example
/// ```ignore
/// let client = GeminiClient::new(std::env::var("GEMINI_API_KEY")?);
/// let reply = client.generate(&request, &AiConfig::default()).await?;
/// ```
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn text_part(text: String) -> Part {
        Part {
            text: Some(text),
            ..Default::default()
        }
    }

    /// Converts a stored conversation turn into Gemini's `Content` format.
    fn convert_turn(turn: &ConversationTurn) -> Content {
        match turn {
            ConversationTurn::User(text) => Content {
                role: "user".to_string(),
                parts: vec![Self::text_part(text.clone())],
            },
            ConversationTurn::ModelText(text) => Content {
                role: "model".to_string(),
                parts: vec![Self::text_part(text.clone())],
            },
            ConversationTurn::ToolCalls(calls) => Content {
                role: "model".to_string(),
                parts: calls
                    .iter()
                    .map(|call| Part {
                        function_call: Some(GeminiFunctionCall {
                            name: call.name.clone(),
                            args: serde_json::Value::Object(call.args.clone()),
                        }),
                        ..Default::default()
                    })
                    .collect(),
            },
            ConversationTurn::ToolResults(outputs) => Content {
                role: "user".to_string(),
                parts: outputs
                    .iter()
                    .map(|output| Part {
                        function_response: Some(GeminiFunctionResponse {
                            name: output.name.clone(),
                            response: output.result.to_json(),
                        }),
                        ..Default::default()
                    })
                    .collect(),
            },
        }
    }

    /// Converts the history, skipping any leading turns that precede the
    /// first user text. Truncation can leave a tool result or model turn at
    /// the front, and Gemini requires the conversation to open with the user.
    fn convert_history(history: &[ConversationTurn]) -> Vec<Content> {
        history
            .iter()
            .skip_while(|turn| turn.role() != TurnRole::User)
            .map(Self::convert_turn)
            .collect()
    }

    fn convert_property(prop: &PropertyDef) -> GeminiPropertySchema {
        GeminiPropertySchema {
            prop_type: prop.prop_type.clone(),
            description: prop.description.clone(),
            enum_values: prop.enum_values.clone(),
            items: prop
                .items
                .as_ref()
                .map(|items| Box::new(Self::convert_property(items))),
        }
    }

    fn convert_tools(tools: &[ToolDescriptor]) -> Vec<GeminiTool> {
        if tools.is_empty() {
            return Vec::new();
        }

        let function_declarations = tools
            .iter()
            .map(|tool| GeminiFunctionDeclaration {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: if tool.parameters.properties.is_empty() {
                    None
                } else {
                    Some(GeminiFunctionParameters {
                        param_type: tool.parameters.param_type.clone(),
                        properties: tool
                            .parameters
                            .properties
                            .iter()
                            .map(|(name, prop)| (name.clone(), Self::convert_property(prop)))
                            .collect(),
                        required: if tool.parameters.required.is_empty() {
                            None
                        } else {
                            Some(tool.parameters.required.clone())
                        },
                    })
                },
            })
            .collect();

        vec![GeminiTool {
            function_declarations,
        }]
    }

    /// Builds the thinking config for models that support it.
    fn thinking_config(config: &AiConfig) -> Option<ThinkingConfig> {
        let supports_thinking = config.model.contains("2.5") || config.model.contains("gemini-3");
        if !supports_thinking {
            return None;
        }

        config.reasoning_enabled.map(|enabled| {
            if enabled {
                let thinking_budget = config.reasoning_effort.as_ref().map(|effort| {
                    match effort.to_lowercase().as_str() {
                        "low" => 1024,
                        "medium" => 4096,
                        "high" => 16384,
                        _ => -1,
                    }
                });
                ThinkingConfig {
                    include_thoughts: Some(true),
                    thinking_budget,
                }
            } else {
                ThinkingConfig {
                    include_thoughts: Some(false),
                    thinking_budget: Some(0),
                }
            }
        })
    }

    fn build_request(request: &ModelRequest<'_>, config: &AiConfig) -> GenerateContentRequest {
        let tools = Self::convert_tools(request.tools);
        let has_tools = !tools.is_empty();

        GenerateContentRequest {
            contents: Self::convert_history(request.history),
            system_instruction: if request.system_instruction.trim().is_empty() {
                None
            } else {
                Some(Content {
                    role: "user".to_string(),
                    parts: vec![Self::text_part(request.system_instruction.to_string())],
                })
            },
            generation_config: Some(GenerationConfig {
                temperature: Some(config.temperature),
                max_output_tokens: config.max_tokens,
                top_p: config.top_p,
                thinking_config: Self::thinking_config(config),
            }),
            tools: has_tools.then_some(tools),
            tool_config: has_tools.then(|| GeminiToolConfig {
                function_calling_config: FunctionCallingConfig {
                    mode: "AUTO".to_string(),
                },
            }),
        }
    }

    /// Splits a response into tool calls, thinking and answer text.
    fn parse_response(response: GenerateContentResponse) -> Result<ModelReply, AiError> {
        let candidate = match response.candidates.and_then(|c| c.into_iter().next()) {
            Some(candidate) => candidate,
            None => {
                let reason = response
                    .prompt_feedback
                    .and_then(|f| f.block_reason)
                    .unwrap_or_else(|| "no candidates".to_string());
                return Err(AiError::EmptyResponse(format!(
                    "prompt blocked or empty ({})",
                    reason
                )));
            }
        };

        let parts = match candidate.content {
            Some(content) => content.parts,
            None => {
                return Err(AiError::EmptyResponse(format!(
                    "candidate has no content (finish reason: {})",
                    candidate.finish_reason.unwrap_or_else(|| "unknown".to_string())
                )))
            }
        };

        let mut reply = ModelReply::default();
        let mut thoughts = Vec::new();
        let mut texts = Vec::new();

        for part in parts {
            if let Some(call) = part.function_call {
                reply.tool_calls.push(ToolCall::new(&call.name, call.args));
            } else if let Some(text) = part.text {
                if part.thought.unwrap_or(false) {
                    thoughts.push(text);
                } else {
                    texts.push(text);
                }
            }
        }

        reply.text = texts.concat();
        if !thoughts.is_empty() {
            reply.thinking = Some(thoughts.join("\n\n"));
        }

        Ok(reply)
    }
}

#[async_trait]
impl AiProvider for GeminiClient {
    async fn generate(
        &self,
        request: &ModelRequest<'_>,
        config: &AiConfig,
    ) -> Result<ModelReply, AiError> {
        // The key goes in a header so transport errors, which print the URL,
        // never carry it.
        let url = format!("{}/models/{}:generateContent", self.base_url, config.model);
        let body = Self::build_request(request, config);

        tracing::debug!(
            "Gemini request to model {}: {} turns, {} tools",
            config.model,
            body.contents.len(),
            request.tools.len()
        );

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await?;

            let message = serde_json::from_str::<GeminiErrorResponse>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(AiError::Api { status, message });
        }

        let response_json: GenerateContentResponse = response.json().await?;
        let reply = Self::parse_response(response_json)?;

        tracing::debug!(
            "Gemini response received: {} chars content, {} chars thinking, {} function calls",
            reply.text.len(),
            reply.thinking.as_ref().map(|t| t.len()).unwrap_or(0),
            reply.tool_calls.len()
        );

        Ok(reply)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ai::{ToolOutput, ToolResult};
    use serde_json::json;

    fn sample_tools() -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("list_linear_teams", "List teams in Linear."),
            ToolDescriptor::new("create_linear_issue", "Create an issue.")
                .param("title", PropertyDef::string("Issue title"))
                .optional("labelIds", PropertyDef::string_list("Label ids")),
        ]
    }

    #[test]
    fn test_convert_turns() {
        let user = GeminiClient::convert_turn(&ConversationTurn::User("Hello!".to_string()));
        assert_eq!(user.role, "user");
        assert_eq!(user.parts[0].text, Some("Hello!".to_string()));

        let model = GeminiClient::convert_turn(&ConversationTurn::ModelText("Hi".to_string()));
        assert_eq!(model.role, "model");

        let calls = GeminiClient::convert_turn(&ConversationTurn::ToolCalls(vec![ToolCall::new(
            "search_google_docs",
            json!({ "query": "atlas" }),
        )]));
        assert_eq!(calls.role, "model");
        let call = calls.parts[0].function_call.as_ref().unwrap();
        assert_eq!(call.name, "search_google_docs");
        assert_eq!(call.args, json!({ "query": "atlas" }));

        let results = GeminiClient::convert_turn(&ConversationTurn::ToolResults(vec![ToolOutput {
            name: "search_google_docs".to_string(),
            result: ToolResult::failure("none found"),
        }]));
        assert_eq!(results.role, "user");
        let response = results.parts[0].function_response.as_ref().unwrap();
        assert_eq!(response.response["success"], false);
    }

    #[test]
    fn test_history_starts_at_first_user_turn() {
        let history = vec![
            ConversationTurn::ToolResults(vec![]),
            ConversationTurn::ModelText("orphan".to_string()),
            ConversationTurn::User("hi".to_string()),
            ConversationTurn::ModelText("hello".to_string()),
        ];

        let contents = GeminiClient::convert_history(&history);
        assert_eq!(contents.len(), 2);
        assert_eq!(contents[0].parts[0].text, Some("hi".to_string()));
    }

    #[test]
    fn test_tool_declarations_serialization() {
        let tools = GeminiClient::convert_tools(&sample_tools());
        let json = serde_json::to_value(&tools).unwrap();

        let declarations = &json[0]["functionDeclarations"];
        // No-parameter functions omit the parameters object
        assert!(declarations[0].get("parameters").is_none());
        assert_eq!(declarations[1]["parameters"]["required"], json!(["title"]));
        assert_eq!(
            declarations[1]["parameters"]["properties"]["labelIds"]["items"]["type"],
            "string"
        );
    }

    #[test]
    fn test_request_without_tools_omits_tool_config() {
        let history = vec![ConversationTurn::User("hi".to_string())];
        let request = ModelRequest {
            system_instruction: "Be brief",
            tools: &[],
            history: &history,
        };

        let body = GeminiClient::build_request(&request, &AiConfig::default());
        let json = serde_json::to_string(&body).unwrap();

        assert!(json.contains("\"systemInstruction\""));
        assert!(json.contains("\"generationConfig\""));
        assert!(!json.contains("toolConfig"));
        assert!(!json.contains("\"tools\""));
    }

    #[test]
    fn test_thinking_config_only_for_supported_models() {
        let mut config = AiConfig {
            model: "gemini-1.5-flash".to_string(),
            reasoning_enabled: Some(true),
            reasoning_effort: Some("high".to_string()),
            ..AiConfig::default()
        };
        assert!(GeminiClient::thinking_config(&config).is_none());

        config.model = "gemini-2.5-flash".to_string();
        let thinking = GeminiClient::thinking_config(&config).unwrap();
        assert_eq!(thinking.thinking_budget, Some(16384));
    }

    #[test]
    fn test_parse_function_calls() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "functionCall": { "name": "list_linear_teams" } },
                        { "functionCall": { "name": "search_linear_issues", "args": { "query": "ENG-1" } } }
                    ]
                },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let reply = GeminiClient::parse_response(response).unwrap();
        assert_eq!(reply.tool_calls.len(), 2);
        assert!(reply.tool_calls[0].args.is_empty());
        assert_eq!(reply.tool_calls[1].args["query"], "ENG-1");
    }

    #[test]
    fn test_parse_text_and_thoughts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "Thinking about files", "thought": true },
                        { "text": "Here are " },
                        { "text": "your files" }
                    ]
                }
            }]
        }))
        .unwrap();

        let reply = GeminiClient::parse_response(response).unwrap();
        assert_eq!(reply.text, "Here are your files");
        assert_eq!(reply.thinking, Some("Thinking about files".to_string()));
        assert!(!reply.has_tool_calls());
    }

    #[tokio::test]
    async fn test_transport_error_does_not_leak_api_key() {
        let client = GeminiClient::new("SECRET_KEY_123".to_string())
            .with_base_url("http://127.0.0.1:1");
        let history = vec![ConversationTurn::User("hi".to_string())];
        let request = ModelRequest {
            system_instruction: "be brief",
            tools: &[],
            history: &history,
        };

        let err = client
            .generate(&request, &AiConfig::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AiError::Http(_)));
        assert!(!err.to_string().contains("SECRET_KEY_123"));
        assert!(!format!("{:?}", err).contains("SECRET_KEY_123"));
    }

    #[test]
    fn test_parse_blocked_prompt() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .unwrap();

        let err = GeminiClient::parse_response(response).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }
}
