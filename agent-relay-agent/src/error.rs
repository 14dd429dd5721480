//! Error types for agent runs

use agent_relay_providers::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Session error: {0}")]
    Session(#[from] agent_relay_core::Error),

    #[error("Halt failed: {0}")]
    Halt(String),
}

pub type Result<T> = std::result::Result<T, AgentError>;
