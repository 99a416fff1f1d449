//! Review assistant HTTP server
//!
//! Thin axum front end over the orchestration agent: a blocking chat
//! endpoint, an SSE endpoint that streams tool progress, and health/admin
//! routes exposing the backend circuit breaker.

mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{Agent, ToolRegistry};
use agent_runtime::{AgentSettings, ProviderSettings, build_provider};
use review_catalog::{InMemoryCatalog, ReviewerCards, SYSTEM_PROMPT};

use crate::handlers::{chat_handler, chat_stream_handler, health_check, reset_breaker};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment before reading RUST_LOG
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let provider_settings = ProviderSettings::from_env()?;
    let agent_settings = AgentSettings::from_env()?;
    tracing::info!(?provider_settings, ?agent_settings, "Configuration loaded");

    // Fails here, not on the first request, when the API key is missing
    let provider = build_provider(&provider_settings)?;

    let mut tools = ToolRegistry::new();
    review_catalog::register_all(&mut tools, Arc::new(InMemoryCatalog::with_sample_data()));
    for name in tools.names() {
        tracing::info!(tool = name, label = %tools.label_for(name), "Tool available");
    }

    let agent = Agent::new(
        provider,
        Arc::new(tools),
        Arc::new(agent_settings.breaker()),
        agent_settings.agent_config(SYSTEM_PROMPT),
    )
    .with_attachments(Arc::new(ReviewerCards));
    let state = AppState::new(agent, agent_settings);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/chat", post(chat_handler))
        .route("/api/chat/stream", post(chat_stream_handler))
        .route("/api/admin/breaker/reset", post(reset_breaker))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(%addr, "Server listening");
    tracing::info!("  GET  /health                   - Health and breaker state");
    tracing::info!("  POST /api/chat                 - Send message");
    tracing::info!("  POST /api/chat/stream          - Send message, stream progress (SSE)");
    tracing::info!("  POST /api/admin/breaker/reset  - Close the circuit breaker");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
