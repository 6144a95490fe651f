use relay::agent::{AgentConfig, AgentCore};
use relay::engine::Engine;
use std::sync::Arc;

use crate::sessions::SessionStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<dyn Engine>,
    pub agent_config: AgentConfig,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(engine: Arc<dyn Engine>, agent_config: AgentConfig) -> Self {
        Self {
            engine,
            agent_config,
            sessions: SessionStore::default(),
        }
    }

    /// Every conversation gets its own core, so sessions never share a registry
    pub fn new_agent(&self) -> Arc<AgentCore> {
        Arc::new(AgentCore::with_config(
            self.engine.clone(),
            self.agent_config,
        ))
    }
}
