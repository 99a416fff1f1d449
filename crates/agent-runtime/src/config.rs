//! Runtime Configuration
//!
//! Everything is read from environment variables. `from_env` is a thin
//! wrapper over `from_lookup`, which takes any key lookup so tests never
//! touch the process environment.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{AgentConfig, AgentError, CircuitBreaker, ProviderAdapter, Result, SamplingParams};
use reqwest::Client;

use crate::{gemini, openai};

/// Which backend adapter to build
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
    OpenAi,
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Self::Gemini),
            "openai" => Ok(Self::OpenAi),
            other => Err(AgentError::Config(format!(
                "LLM_PROVIDER must be 'gemini' or 'openai', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gemini => write!(f, "gemini"),
            Self::OpenAi => write!(f, "openai"),
        }
    }
}

/// Backend connection settings
#[derive(Clone)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub api_key: String,
    pub model: String,
    pub api_base: Option<String>,

    /// HTTP client timeout
    pub timeout: Duration,
}

// Keep the key out of logs.
impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("kind", &self.kind)
            .field("api_key", &if self.api_key.is_empty() { "<unset>" } else { "<redacted>" })
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let kind = get("LLM_PROVIDER")
            .map_or(Ok(ProviderKind::Gemini), |v| v.parse())?;

        let (api_key, model, api_base) = match kind {
            ProviderKind::Gemini => (
                get("GEMINI_API_KEY"),
                get("LLM_MODEL").unwrap_or_else(|| gemini::DEFAULT_MODEL.into()),
                get("GEMINI_API_BASE"),
            ),
            ProviderKind::OpenAi => (
                get("OPENAI_API_KEY"),
                get("OPENAI_MODEL").unwrap_or_else(|| openai::DEFAULT_MODEL.into()),
                get("OPENAI_API_BASE"),
            ),
        };

        Ok(Self {
            kind,
            api_key: api_key.unwrap_or_default(),
            model,
            api_base,
            timeout: Duration::from_secs(parse_or(&get, "LLM_TIMEOUT_SECS", 60)?),
        })
    }

    /// Name of the variable holding this provider's key
    pub const fn key_var(&self) -> &'static str {
        match self.kind {
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::OpenAi => "OPENAI_API_KEY",
        }
    }
}

/// Breaker and loop settings
#[derive(Clone, Debug)]
pub struct AgentSettings {
    pub breaker_failure_threshold: u32,
    pub breaker_recovery: Duration,
    pub max_iterations: usize,
    pub generate_timeout: Duration,
    pub tool_timeout: Duration,

    /// Capacity of the per-request progress channel
    pub progress_buffer: usize,
}

impl Default for AgentSettings {
    fn default() -> Self {
        let agent = AgentConfig::default();
        Self {
            breaker_failure_threshold: agent_core::breaker::DEFAULT_FAILURE_THRESHOLD,
            breaker_recovery: agent_core::breaker::DEFAULT_RECOVERY_TIMEOUT,
            max_iterations: agent_core::DEFAULT_MAX_ITERATIONS,
            generate_timeout: agent.generate_timeout,
            tool_timeout: agent.tool_timeout,
            progress_buffer: 32,
        }
    }
}

impl AgentSettings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let d = Self::default();

        Ok(Self {
            breaker_failure_threshold: parse_or(
                &get,
                "BREAKER_FAILURE_THRESHOLD",
                d.breaker_failure_threshold,
            )?,
            breaker_recovery: Duration::from_secs(parse_or(
                &get,
                "BREAKER_RECOVERY_SECS",
                d.breaker_recovery.as_secs(),
            )?),
            max_iterations: parse_or(&get, "AGENT_MAX_ITERATIONS", d.max_iterations)?,
            generate_timeout: Duration::from_secs(parse_or(
                &get,
                "AGENT_GENERATE_TIMEOUT_SECS",
                d.generate_timeout.as_secs(),
            )?),
            tool_timeout: Duration::from_secs(parse_or(
                &get,
                "AGENT_TOOL_TIMEOUT_SECS",
                d.tool_timeout.as_secs(),
            )?),
            progress_buffer: parse_or(&get, "AGENT_PROGRESS_BUFFER", d.progress_buffer)?,
        })
    }

    /// The process-wide breaker guarding the backend
    pub fn breaker(&self) -> CircuitBreaker {
        CircuitBreaker::new("llm", self.breaker_failure_threshold, self.breaker_recovery)
    }

    /// Loop configuration with the given system prompt
    pub fn agent_config(&self, system_prompt: impl Into<String>) -> AgentConfig {
        AgentConfig {
            system_prompt: system_prompt.into(),
            sampling: SamplingParams::default(),
            generate_timeout: self.generate_timeout,
            tool_timeout: self.tool_timeout,
        }
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    get(key).map_or(Ok(default), |raw| {
        raw.trim()
            .parse()
            .map_err(|_| AgentError::Config(format!("{key} has invalid value '{raw}'")))
    })
}

/// Build the configured adapter. Fails when the selected provider's key is
/// missing so misconfiguration surfaces at startup, not on the first request.
pub fn build_provider(settings: &ProviderSettings) -> Result<Arc<dyn ProviderAdapter>> {
    if settings.api_key.trim().is_empty() {
        return Err(AgentError::Config(format!(
            "{} is not set (LLM_PROVIDER={})",
            settings.key_var(),
            settings.kind
        )));
    }

    let client = Client::builder()
        .timeout(settings.timeout)
        .build()
        .map_err(|e| AgentError::Config(format!("failed to build HTTP client: {e}")))?;

    let api_base = settings.api_base.as_deref();
    let provider: Arc<dyn ProviderAdapter> = match settings.kind {
        ProviderKind::Gemini => Arc::new(gemini::GeminiProvider::new(
            client,
            &settings.api_key,
            api_base,
            &settings.model,
        )),
        ProviderKind::OpenAi => Arc::new(openai::OpenAiProvider::new(
            client,
            &settings.api_key,
            api_base,
            &settings.model,
        )),
    };

    tracing::info!(provider = %settings.kind, model = %settings.model, "LLM provider configured");
    Ok(provider)
}
