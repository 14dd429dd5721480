//! Stop tool: lets the agent (or the relay on its behalf) end a generation

use crate::base::{Result, Tool};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::OnceLock;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Message recorded when no explicit reason is given
pub const DEFAULT_STOP_MESSAGE: &str = "The agent has been gracefully stopped!";

/// Ends the current agent run.
///
/// Executing the tool cancels the run's token; the agent loop checks the
/// token between provider round-trips and stops requesting completions.
/// The first reason given is kept.
pub struct StopTool {
    token: CancellationToken,
    reason: OnceLock<String>,
}

impl StopTool {
    /// Create a stop tool bound to `token`
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            reason: OnceLock::new(),
        }
    }

    /// Token cancelled when the tool runs
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Reason given by the first invocation
    pub fn reason(&self) -> Option<&str> {
        self.reason.get().map(String::as_str)
    }

    /// Stop without going through the tool-call path
    pub fn stop(&self, message: &str) -> &str {
        let reason = self.reason.get_or_init(|| message.to_string());
        if !self.token.is_cancelled() {
            info!("Stop tool invoked: {}", reason);
            self.token.cancel();
        }
        reason
    }
}

#[async_trait]
impl Tool for StopTool {
    fn name(&self) -> &str {
        "stop"
    }

    fn description(&self) -> &str {
        "Stop the current response immediately. Use when the user asks you to stop \
         or when you have been interrupted."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "message": {
                    "type": "string",
                    "description": "Optional: short note on why the response was stopped"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, args: Value) -> Result<String> {
        let message = args
            .get("message")
            .and_then(|v| v.as_str())
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_STOP_MESSAGE);
        Ok(self.stop(message).to_string())
    }
}
