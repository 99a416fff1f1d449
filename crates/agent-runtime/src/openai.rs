//! OpenAI Provider
//!
//! History-replay adapter for `/chat/completions`. The backend keeps no tool
//! context of its own, so every tool round trip is recorded as a synthetic
//! assistant message carrying `tool_calls`, followed by a `tool` message that
//! answers it by `tool_call_id`. The full history is replayed on every call.

use agent_core::{
    ConversationTurn, ProviderAdapter, ProviderConfig, ProviderResponse, ProviderTools,
    RawToolCall, Result, Role, ToolCall, ToolDeclaration, ToolResult,
    provider::parse_arguments,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::http::send_json;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// OpenAI chat-completions provider
pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiProvider {
    pub fn new(client: Client, api_key: &str, api_base: Option<&str>, model: &str) -> Self {
        let base_url = api_base
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        tracing::debug!(base_url = %base_url, model, "Initialized OpenAI provider");

        Self {
            client,
            api_key: api_key.to_string(),
            base_url,
            model: model.to_string(),
        }
    }

    fn request_body(&self, turns: &[ConversationTurn], config: &ProviderConfig) -> Value {
        let mut messages = Vec::with_capacity(turns.len() + 1);
        if !config.system_instruction.is_empty() {
            messages.push(ChatMessage {
                role: "system",
                content: Some(config.system_instruction.clone()),
                ..ChatMessage::default()
            });
        }
        messages.extend(turns.iter().filter_map(to_message));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": config.sampling.temperature,
            "top_p": config.sampling.top_p,
            "max_tokens": config.sampling.max_output_tokens,
        });
        if !config.tools.is_empty() {
            body["tools"] = config.tools.0.clone();
            body["tool_choice"] = json!("auto");
        }
        body
    }

    fn parse(response: &ProviderResponse) -> Option<ResponseMessage> {
        match CompletionResponse::deserialize(&response.body) {
            Ok(parsed) => parsed.choices.into_iter().next().map(|c| c.message),
            Err(e) => {
                tracing::warn!(error = %e, "Unexpected OpenAI response shape");
                None
            }
        }
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Default, Serialize)]
struct ChatMessage {
    role: &'static str,
    // Serialized as null on assistant tool-call messages.
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunction,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCall>>,
}

/// ID used when the backend did not assign one
fn synthetic_call_id(call: &ToolCall) -> String {
    format!("call_{}_{}", call.name, uuid::Uuid::new_v4().simple())
}

fn to_message(turn: &ConversationTurn) -> Option<ChatMessage> {
    if let Some(result) = &turn.tool_result {
        return Some(ChatMessage {
            role: "tool",
            content: Some(Value::Object(result.to_json()).to_string()),
            tool_call_id: result.id.clone(),
            ..ChatMessage::default()
        });
    }

    if let Some(call) = &turn.tool_call {
        return Some(ChatMessage {
            role: "assistant",
            content: turn.content.clone(),
            tool_calls: Some(vec![WireToolCall {
                id: call.id.clone().unwrap_or_else(|| synthetic_call_id(call)),
                call_type: function_type(),
                function: WireFunction {
                    name: call.name.clone(),
                    arguments: Value::Object(call.arguments.clone()).to_string(),
                },
            }]),
            ..ChatMessage::default()
        });
    }

    let text = turn.content.clone().filter(|t| !t.is_empty())?;
    let role = match turn.role {
        Role::Model => "assistant",
        Role::User | Role::Tool => "user",
    };
    Some(ChatMessage {
        role,
        content: Some(text),
        ..ChatMessage::default()
    })
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn convert_tool_declarations(&self, declarations: &[ToolDeclaration]) -> ProviderTools {
        if declarations.is_empty() {
            return ProviderTools::default();
        }
        let tools: Vec<Value> = declarations
            .iter()
            .map(|d| {
                json!({
                    "type": "function",
                    "function": {
                        "name": d.name,
                        "description": d.description,
                        "parameters": d.parameters,
                    },
                })
            })
            .collect();
        ProviderTools(Value::Array(tools))
    }

    async fn generate(
        &self,
        turns: &[ConversationTurn],
        config: &ProviderConfig,
    ) -> Result<ProviderResponse> {
        let body = self.request_body(turns, config);
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(model = %self.model, turns = turns.len(), "Sending chat completion request");

        let value = send_json("openai", || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        Ok(ProviderResponse::new(value))
    }

    fn extract_tool_call_raw(&self, response: &ProviderResponse) -> Option<RawToolCall> {
        let message = Self::parse(response)?;
        let calls = message.tool_calls.unwrap_or_default();
        if calls.len() > 1 {
            tracing::debug!(
                count = calls.len(),
                "Multiple tool calls returned, using the first"
            );
        }
        let first = calls.into_iter().next()?;

        Some(RawToolCall {
            call: ToolCall::new(first.function.name, parse_arguments(&first.function.arguments))
                .with_id(first.id),
            leading_text: message.content.filter(|t| !t.is_empty()),
            token: None,
        })
    }

    fn extract_text(&self, response: &ProviderResponse) -> Option<String> {
        Self::parse(response)?
            .content
            .filter(|t| !t.is_empty())
    }

    fn build_tool_response_turns(
        &self,
        raw: &RawToolCall,
        result: &ToolResult,
    ) -> Vec<ConversationTurn> {
        let id = raw
            .call
            .id
            .clone()
            .unwrap_or_else(|| synthetic_call_id(&raw.call));
        let call = raw.call.clone().with_id(id.clone());

        vec![
            ConversationTurn::model_tool_call(call, raw.leading_text.clone(), None),
            ConversationTurn::tool_result(result.clone().with_id(Some(id)), None),
        ]
    }
}
