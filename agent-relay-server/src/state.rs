use agent_relay_agent::AgentOrchestrator;
use agent_relay_core::config::Config;
use agent_relay_core::session::{ChatMessage, SessionManager};
use agent_relay_core::signal::{build_signal_store, SignalStore};
use agent_relay_providers::{ChatCompletionsClient, LLMProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: AgentOrchestrator,
    pub store: Arc<dyn SignalStore>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(
        config: Config,
        provider: Arc<dyn LLMProvider>,
        store: Arc<dyn SignalStore>,
    ) -> Self {
        let sessions = Arc::new(SessionManager::new(&config.session.dir));
        let orchestrator =
            AgentOrchestrator::from_config(provider, sessions.clone(), store.clone(), &config);
        Self {
            config: Arc::new(config),
            orchestrator,
            store,
            sessions,
        }
    }

    /// Build the production state: chat-completions provider plus the
    /// configured signal store
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let provider = Arc::new(ChatCompletionsClient::from_config(&config.model));
        let store = build_signal_store(&config.signal)?;
        Ok(Self::new(config, provider, store))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub chat_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopRequest {
    pub chat_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub redis: String,
}

impl HealthResponse {
    pub fn from_ping(reachable: bool) -> Self {
        let (status, redis) = if reachable {
            ("healthy", "connected")
        } else {
            ("degraded", "disconnected")
        };
        Self {
            status: status.to_string(),
            redis: redis.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub chat_id: String,
    pub turns: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
