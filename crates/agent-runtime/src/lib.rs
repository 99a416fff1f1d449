//! # agent-runtime
//!
//! Backend adapters for the orchestration core.
//!
//! ## Providers
//!
//! - **Gemini** (default): token-preserving; echoes thought signatures
//! - **OpenAI**: history-replay via `/chat/completions`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use agent_runtime::{AgentSettings, ProviderSettings, build_provider};
//!
//! let settings = AgentSettings::from_env()?;
//! let provider = build_provider(&ProviderSettings::from_env()?)?;
//! let agent = Agent::new(provider, tools, Arc::new(settings.breaker()), settings.agent_config(prompt));
//! ```

pub mod config;
pub mod gemini;
mod http;
pub mod openai;

pub use config::{AgentSettings, ProviderKind, ProviderSettings, build_provider};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

// Re-export core types for convenience
pub use agent_core::{Agent, AgentError, ProviderAdapter, Result, Role, Tool, ToolRegistry};
