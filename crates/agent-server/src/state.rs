//! Application State

use std::sync::Arc;

use agent_core::Agent;
use agent_runtime::AgentSettings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Orchestration agent shared by every request. Owns the process-wide
    /// circuit breaker.
    pub agent: Arc<Agent>,

    pub settings: Arc<AgentSettings>,
}

impl AppState {
    pub fn new(agent: Agent, settings: AgentSettings) -> Self {
        Self {
            agent: Arc::new(agent),
            settings: Arc::new(settings),
        }
    }
}
