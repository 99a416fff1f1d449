//! # agent-core
//!
//! Provider-agnostic orchestration core for a tool-calling chat assistant.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                             Agent                                │
//! │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────────────┐  │
//! │  │Orchestration│──│    Tool     │  │ ProviderAdapter          │  │
//! │  │    Loop     │  │  Registry   │  │ (token-preserving or     │  │
//! │  │             │──│             │  │  history-replay)         │  │
//! │  └──────┬──────┘  └─────────────┘  └────────────▲─────────────┘  │
//! │         │                                       │                │
//! │  ┌──────▼──────┐                     ┌──────────┴───────────┐    │
//! │  │ ProgressSink│                     │   CircuitBreaker     │    │
//! │  └─────────────┘                     └──────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `ProviderAdapter` trait hides how each backend keeps tool-call context
//! between requests, so the loop never needs to know which one it is using.

pub mod breaker;
pub mod error;
pub mod message;
pub mod progress;
pub mod provider;
pub mod reasoning;
pub mod run;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;

pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitState};
pub use error::{AgentError, Result};
pub use message::{ContinuationToken, Conversation, ConversationTurn, Role};
pub use progress::{ChannelSink, NoopSink, ProgressEvent, ProgressSink, StepStatus};
pub use provider::{
    ProviderAdapter, ProviderConfig, ProviderResponse, ProviderTools, RawToolCall, SamplingParams,
};
pub use reasoning::{
    Agent, AgentConfig, DEFAULT_MAX_ITERATIONS, DEGRADED_MESSAGE, EMPTY_RESPONSE_MESSAGE,
    LIMIT_FALLBACK_MESSAGE,
};
pub use run::{Attachment, AttachmentExtractor, RunId, RunOutcome, ToolInvocation};
pub use tool::{
    JsonMap, ParameterSchema, Tool, ToolCall, ToolDeclaration, ToolRegistry, ToolResult,
};
