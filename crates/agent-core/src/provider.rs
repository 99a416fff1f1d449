//! Provider Adapter Strategy
//!
//! One interface over model backends that differ in how they keep tool-call
//! context between requests. The orchestration loop only ever talks to
//! [`ProviderAdapter`] and never branches on which backend is behind it.
//!
//! Requests are always rebuilt from the full neutral turn sequence. Each
//! adapter decides how a tool-call turn and its result are laid out on the
//! wire, and what (if anything) goes into the [`ContinuationToken`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::message::{ContinuationToken, ConversationTurn, Role};
use crate::tool::{ToolCall, ToolDeclaration, ToolResult};

/// Sampling parameters sent with every request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Top-p nucleus sampling
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Maximum tokens to generate
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
}

const fn default_temperature() -> f32 {
    0.7
}
const fn default_top_p() -> f32 {
    0.95
}
const fn default_max_output_tokens() -> u32 {
    2048
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: default_max_output_tokens(),
        }
    }
}

/// Tool declarations in the backend's own wire format
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderTools(pub Value);

impl ProviderTools {
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            Value::Null => true,
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }
}

/// Per-agent request configuration, built once and reused for every call
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderConfig {
    pub system_instruction: String,
    pub tools: ProviderTools,
    pub sampling: SamplingParams,
}

/// Raw backend response body. Only the adapter that produced it interprets it.
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderResponse {
    pub body: Value,
}

impl ProviderResponse {
    pub const fn new(body: Value) -> Self {
        Self { body }
    }
}

/// Everything the adapter needs to lay out the tool-call/tool-result pair:
/// the parsed call plus whatever the backend attached to it.
#[derive(Clone, Debug, PartialEq)]
pub struct RawToolCall {
    pub call: ToolCall,

    /// Text the model emitted alongside the call
    pub leading_text: Option<String>,

    /// Opaque value to echo back, if the backend produced one
    pub token: Option<ContinuationToken>,
}

/// Strategy trait for model backends
///
/// Implement this trait to add support for new backends.
/// The agent works exclusively through this interface.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for logs and health output (e.g. "gemini", "openai")
    fn name(&self) -> &str;

    /// Model identifier sent with requests
    fn model(&self) -> &str;

    /// Build a plain text turn
    fn build_content(&self, role: Role, text: &str) -> ConversationTurn {
        ConversationTurn::text(role, text)
    }

    /// Translate neutral declarations into the backend's tool format
    fn convert_tool_declarations(&self, declarations: &[ToolDeclaration]) -> ProviderTools;

    /// Assemble the per-agent request configuration
    fn build_config(
        &self,
        system_instruction: &str,
        tools: ProviderTools,
        sampling: &SamplingParams,
    ) -> ProviderConfig {
        ProviderConfig {
            system_instruction: system_instruction.to_string(),
            tools,
            sampling: sampling.clone(),
        }
    }

    /// Send the whole conversation to the backend
    async fn generate(
        &self,
        turns: &[ConversationTurn],
        config: &ProviderConfig,
    ) -> Result<ProviderResponse>;

    /// Whether the response asks for a tool
    fn has_tool_call(&self, response: &ProviderResponse) -> bool {
        self.extract_tool_call(response).is_some()
    }

    /// First tool call in the response. Backends that return several are
    /// reduced to the first.
    fn extract_tool_call(&self, response: &ProviderResponse) -> Option<ToolCall> {
        self.extract_tool_call_raw(response).map(|raw| raw.call)
    }

    /// First tool call together with its backend-specific context
    fn extract_tool_call_raw(&self, response: &ProviderResponse) -> Option<RawToolCall>;

    /// Concatenated text of the response, if any
    fn extract_text(&self, response: &ProviderResponse) -> Option<String>;

    /// The model-turn/tool-result-turn pair to append after a dispatch
    fn build_tool_response_turns(
        &self,
        raw: &RawToolCall,
        result: &ToolResult,
    ) -> Vec<ConversationTurn>;
}

/// Parse a JSON-encoded argument string into a map. Anything that is not an
/// object becomes an empty map.
pub fn parse_arguments(raw: &str) -> crate::tool::JsonMap {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            if !raw.trim().is_empty() {
                tracing::warn!(arguments = %raw, "Tool arguments were not a JSON object");
            }
            crate::tool::JsonMap::new()
        }
    }
}
