//! Test doubles for the provider and progress seams

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::message::{ContinuationToken, ConversationTurn};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::provider::{
    ProviderAdapter, ProviderConfig, ProviderResponse, ProviderTools, RawToolCall,
};
use crate::tool::{JsonMap, ToolCall, ToolDeclaration, ToolResult};

/// One scripted backend reply
#[derive(Clone, Debug)]
pub enum Step {
    Text(String),
    Call { name: String, args: JsonMap },
    Fail(String),
    Hang,
}

impl Step {
    pub fn text(text: &str) -> Self {
        Self::Text(text.into())
    }

    pub fn call(name: &str, args: Value) -> Self {
        Self::Call {
            name: name.into(),
            args: args.as_object().cloned().unwrap_or_default(),
        }
    }
}

/// Provider that replays a fixed script and records every request
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Step>,
    calls: AtomicUsize,
    requests: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedProvider {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            fallback: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `step` forever
    pub fn always(step: Step) -> Self {
        Self {
            fallback: Some(step),
            ..Self::new([])
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Turn sequences received, one entry per `generate` call
    pub fn requests(&self) -> Vec<Vec<ConversationTurn>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    fn convert_tool_declarations(&self, declarations: &[ToolDeclaration]) -> ProviderTools {
        ProviderTools(serde_json::to_value(declarations).unwrap_or(Value::Null))
    }

    async fn generate(
        &self,
        turns: &[ConversationTurn],
        _config: &ProviderConfig,
    ) -> Result<ProviderResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(turns.to_vec());

        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .ok_or_else(|| AgentError::Provider("script exhausted".into()))?;

        match step {
            Step::Text(text) => Ok(ProviderResponse::new(json!({ "text": text }))),
            Step::Call { name, args } => Ok(ProviderResponse::new(json!({
                "call": { "name": name, "args": args },
                "token": format!("tok-{n}"),
            }))),
            Step::Fail(message) => Err(AgentError::Provider(message)),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(ProviderResponse::new(json!({ "text": "late" })))
            }
        }
    }

    fn extract_tool_call_raw(&self, response: &ProviderResponse) -> Option<RawToolCall> {
        let call = response.body.get("call")?;
        let name = call.get("name")?.as_str()?;
        let args = call
            .get("args")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Some(RawToolCall {
            call: ToolCall::new(name, args),
            leading_text: None,
            token: response
                .body
                .get("token")
                .and_then(Value::as_str)
                .map(ContinuationToken::new),
        })
    }

    fn extract_text(&self, response: &ProviderResponse) -> Option<String> {
        response
            .body
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    fn build_tool_response_turns(
        &self,
        raw: &RawToolCall,
        result: &ToolResult,
    ) -> Vec<ConversationTurn> {
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

/// Sink that keeps every event
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProgressSink for RecordingSink {
    async fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
