//! HTTP Handlers

use std::sync::Arc;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tokio_util::sync::CancellationToken;

use agent_core::{
    AgentError, Attachment, BreakerSnapshot, ChannelSink, CircuitState, ConversationTurn,
    NoopSink, Role, RunId, RunOutcome,
};

use crate::state::AppState;

/// Longest accepted user message, in characters
const MAX_MESSAGE_CHARS: usize = 4000;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub model: String,
    pub tools: Vec<String>,
    pub breaker: BreakerSnapshot,
}

/// A prior text turn supplied by the client
#[derive(Debug, Deserialize)]
pub struct HistoryItem {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub history: Vec<HistoryItem>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub run_id: RunId,
    pub response: String,
    pub tools_invoked: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    pub iterations: usize,
    pub degraded: bool,
    pub limit_reached: bool,
}

impl From<RunOutcome> for ChatResponse {
    fn from(outcome: RunOutcome) -> Self {
        Self {
            run_id: outcome.run_id,
            response: outcome.final_text,
            tools_invoked: outcome.tools_invoked,
            attachments: outcome.attachments,
            iterations: outcome.iterations,
            degraded: outcome.degraded,
            limit_reached: outcome.limit_reached,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

fn agent_error(err: &AgentError) -> ApiError {
    let status = if err.is_retryable() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    api_error(status, err.user_message(), "AGENT_ERROR")
}

impl ChatRequest {
    /// Validate and split into prior turns plus the new message
    fn into_parts(self) -> Result<(Vec<ConversationTurn>, String), ApiError> {
        let message = self.message.trim();
        if message.is_empty() {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "message must not be empty",
                "INVALID_REQUEST",
            ));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                format!("message must be at most {MAX_MESSAGE_CHARS} characters"),
                "INVALID_REQUEST",
            ));
        }

        let mut history = Vec::with_capacity(self.history.len());
        for item in self.history {
            let role = item
                .role
                .parse::<Role>()
                .ok()
                .filter(|r| *r != Role::Tool)
                .ok_or_else(|| {
                    api_error(
                        StatusCode::BAD_REQUEST,
                        format!("history role must be 'user' or 'model', got '{}'", item.role),
                        "INVALID_REQUEST",
                    )
                })?;
            history.push(ConversationTurn::text(role, item.content));
        }

        Ok((history, message.to_string()))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check with breaker state
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let agent = &state.agent;
    let breaker = agent.breaker().snapshot();

    Json(HealthResponse {
        status: if breaker.state == CircuitState::Closed {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        provider: agent.provider().name().to_string(),
        model: agent.provider().model().to_string(),
        tools: agent.tools().names().into_iter().map(String::from).collect(),
        breaker,
    })
}

/// Main chat endpoint (non-streaming)
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let (history, message) = payload.into_parts()?;

    let outcome = state
        .agent
        .process_message(&history, &message, state.settings.max_iterations, &NoopSink)
        .await
        .map_err(|e| agent_error(&e))?;

    Ok(Json(outcome.into()))
}

/// Chat with server-sent progress events.
///
/// The run executes on its own task. Closing the connection drops the event
/// stream, which cancels the run before its next backend call.
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let (history, message) = payload.into_parts()?;

    let cancel = CancellationToken::new();
    let (sink, rx) = ChannelSink::new(state.settings.progress_buffer);
    let sink = sink.with_cancel(cancel.clone());

    let agent = Arc::clone(&state.agent);
    let max_iterations = state.settings.max_iterations;
    let run_cancel = cancel.clone();

    tokio::spawn(async move {
        // The terminal event already carries the outcome.
        if let Err(err) = agent
            .process_message_with_cancel(&history, &message, max_iterations, &sink, &run_cancel)
            .await
        {
            tracing::debug!(error = %err, "Streamed run ended with an error");
        }
    });

    let guard = cancel.drop_guard();
    let events = ReceiverStream::new(rx).map(move |event| {
        let _guard = &guard;
        Event::default().json_data(event)
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// Force the breaker closed
pub async fn reset_breaker(State(state): State<AppState>) -> Json<BreakerSnapshot> {
    let breaker = state.agent.breaker();
    tracing::warn!(breaker = breaker.name(), "Circuit breaker reset by operator");
    breaker.reset();
    Json(breaker.snapshot())
}
