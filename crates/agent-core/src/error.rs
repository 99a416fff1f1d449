//! Error Types

use std::time::Duration;

use thiserror::Error;

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent error types
///
/// Only backend-call failures escape a run. Tool-side variants are produced by
/// the dispatcher and folded into error payloads before the model sees them.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Model backend returned an error or an unusable response
    #[error("Provider error: {0}")]
    Provider(String),

    /// Model backend unreachable
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// A backend or tool call exceeded its time budget
    #[error("{operation} timed out after {}s", .after.as_secs())]
    Timeout { operation: String, after: Duration },

    /// The run was cancelled before the next backend call
    #[error("Run cancelled")]
    Cancelled,

    /// Tool not found in registry
    #[error("Unknown function: {0}")]
    ToolNotFound(String),

    /// Tool arguments failed validation
    #[error("Invalid arguments: {0}")]
    ToolValidation(String),

    /// Tool handler failed or panicked
    #[error("Function execution failed: {0}")]
    ToolExecution(String),

    /// Malformed backend payload
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable(_) | Self::RateLimited(_) | Self::Timeout { .. }
        )
    }

    /// Whether this error belongs to tool dispatch rather than the backend.
    pub const fn is_tool_error(&self) -> bool {
        matches!(
            self,
            Self::ToolNotFound(_) | Self::ToolValidation(_) | Self::ToolExecution(_)
        )
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::ProviderUnavailable(_) | Self::Timeout { .. } => {
                "The AI service is taking too long to respond right now. Please try again in a moment.".into()
            }
            Self::Cancelled => "The request was cancelled.".into(),
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) | Self::Config(_) => {
                "The AI service is not configured correctly. Please contact support.".into()
            }
            _ => "I'm sorry, I encountered an error processing your request. Please try again.".into(),
        }
    }
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
