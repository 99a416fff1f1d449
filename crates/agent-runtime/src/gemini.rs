//! Gemini Provider
//!
//! Token-preserving adapter for the `generateContent` REST API. Tool calls
//! may carry a `thoughtSignature`; it is stored as the turn's continuation
//! token and sent back, byte for byte, on both the replayed `functionCall`
//! part and the `functionResponse` part that answers it.

use agent_core::{
    ContinuationToken, ConversationTurn, ProviderAdapter, ProviderConfig, ProviderResponse,
    ProviderTools, RawToolCall, Result, Role, ToolCall, ToolDeclaration, ToolResult,
    tool::{JsonMap, ParameterSchema},
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::http::send_json;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

/// Gemini provider
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: &str, api_base: Option<&str>, model: &str) -> Self {
        let base_url = api_base
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        tracing::debug!(base_url = %base_url, model, "Initialized Gemini provider");

        Self {
            client,
            api_key: api_key.to_string(),
            base_url,
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    /// Request body for a turn sequence
    fn request_body(turns: &[ConversationTurn], config: &ProviderConfig) -> Value {
        let contents: Vec<Content> = turns.iter().filter_map(to_content).collect();

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": config.sampling.temperature,
                "topP": config.sampling.top_p,
                "maxOutputTokens": config.sampling.max_output_tokens,
            },
        });
        if !config.system_instruction.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": config.system_instruction }] });
        }
        if !config.tools.is_empty() {
            body["tools"] = config.tools.0.clone();
        }
        body
    }

    fn parse(response: &ProviderResponse) -> Option<GenerateContentResponse> {
        match GenerateContentResponse::deserialize(&response.body) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected Gemini response shape");
                None
            }
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    thought_signature: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    thought: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: JsonMap,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: JsonMap,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
}

impl GenerateContentResponse {
    fn parts(&self) -> &[Part] {
        self.candidates
            .first()
            .map_or(&[][..], |c| c.content.parts.as_slice())
    }
}

fn text_part(text: &str) -> Part {
    Part {
        text: Some(text.to_string()),
        ..Part::default()
    }
}

/// Neutral turn to a Gemini content. Empty turns are skipped.
fn to_content(turn: &ConversationTurn) -> Option<Content> {
    let signature = turn
        .continuation_token
        .as_ref()
        .map(|t| t.as_str().to_string());

    if let Some(result) = &turn.tool_result {
        // The payload travels as a JSON string under "result".
        let mut response = JsonMap::new();
        response.insert(
            "result".into(),
            Value::String(Value::Object(result.to_json()).to_string()),
        );
        return Some(Content {
            role: "user".into(),
            parts: vec![Part {
                function_response: Some(FunctionResponse {
                    name: result.name.clone(),
                    response,
                }),
                thought_signature: signature,
                ..Part::default()
            }],
        });
    }

    if let Some(call) = &turn.tool_call {
        let mut parts: Vec<Part> = turn.content.as_deref().map(text_part).into_iter().collect();
        parts.push(Part {
            function_call: Some(FunctionCall {
                name: call.name.clone(),
                args: call.arguments.clone(),
            }),
            thought_signature: signature,
            ..Part::default()
        });
        return Some(Content {
            role: "model".into(),
            parts,
        });
    }

    let text = turn.content.as_deref().filter(|t| !t.is_empty())?;
    let role = match turn.role {
        Role::Model => "model",
        Role::User | Role::Tool => "user",
    };
    Some(Content {
        role: role.into(),
        parts: vec![text_part(text)],
    })
}

/// Gemini schema types are upper-case
fn convert_schema(schema: &ParameterSchema) -> Value {
    let mut out = json!({
        "type": schema.param_type.to_ascii_uppercase(),
        "description": schema.description,
    });
    if let Some(values) = &schema.enum_values {
        out["enum"] = json!(values);
    }
    if let Some(items) = &schema.items {
        out["items"] = convert_schema(items);
    }
    out
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn convert_tool_declarations(&self, declarations: &[ToolDeclaration]) -> ProviderTools {
        if declarations.is_empty() {
            return ProviderTools::default();
        }

        let functions: Vec<Value> = declarations
            .iter()
            .map(|d| {
                let properties: JsonMap = d
                    .parameters
                    .properties
                    .iter()
                    .map(|(name, schema)| (name.clone(), convert_schema(schema)))
                    .collect();
                json!({
                    "name": d.name,
                    "description": d.description,
                    "parameters": {
                        "type": "OBJECT",
                        "properties": properties,
                        "required": d.parameters.required,
                    },
                })
            })
            .collect();

        ProviderTools(json!([{ "functionDeclarations": functions }]))
    }

    async fn generate(
        &self,
        turns: &[ConversationTurn],
        config: &ProviderConfig,
    ) -> Result<ProviderResponse> {
        let body = Self::request_body(turns, config);
        let url = self.endpoint();
        tracing::debug!(model = %self.model, turns = turns.len(), "Sending generateContent request");

        let value = send_json("gemini", || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        Ok(ProviderResponse::new(value))
    }

    fn extract_tool_call_raw(&self, response: &ProviderResponse) -> Option<RawToolCall> {
        let parsed = Self::parse(response)?;
        let parts = parsed.parts();
        let index = parts.iter().position(|p| p.function_call.is_some())?;
        let part = &parts[index];
        let call = part.function_call.as_ref()?;

        let leading: String = parts[..index]
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect();

        Some(RawToolCall {
            call: ToolCall::new(call.name.clone(), call.args.clone()),
            leading_text: (!leading.is_empty()).then_some(leading),
            token: part
                .thought_signature
                .as_deref()
                .map(ContinuationToken::new),
        })
    }

    fn extract_text(&self, response: &ProviderResponse) -> Option<String> {
        let parsed = Self::parse(response)?;
        let text: String = parsed
            .parts()
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.text.as_deref())
            .collect();
        (!text.is_empty()).then_some(text)
    }

    fn build_tool_response_turns(
        &self,
        raw: &RawToolCall,
        result: &ToolResult,
    ) -> Vec<ConversationTurn> {
        if raw.token.is_none() {
            tracing::debug!(tool = %raw.call.name, "Tool call carried no thought signature");
        }
        vec![
            ConversationTurn::model_tool_call(
                raw.call.clone(),
                raw.leading_text.clone(),
                raw.token.clone(),
            ),
            ConversationTurn::tool_result(result.clone(), raw.token.clone()),
        ]
    }
}
