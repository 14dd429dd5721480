use anyhow::Result;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::mpsc;

pub const DEFAULT_SERVER: &str = "http://localhost:8000";

/// Events read back from the chat stream
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Delta(String),
    Stopped,
    Error(String),
}

#[derive(Debug, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub redis: String,
}

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_SERVER.to_string());
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn chat(
        &self,
        chat_id: &str,
        message: &str,
        event_tx: mpsc::UnboundedSender<ChatEvent>,
    ) -> Result<()> {
        let url = format!("{}/api/v1/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "message": message }))
            .send()
            .await?;

        if !response.status().is_success() {
            anyhow::bail!("Server returned error: {}", response.status());
        }

        let mut stream = response.bytes_stream().eventsource();

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(event) => match event.event.as_str() {
                    "delta" => ChatEvent::Delta(event.data),
                    "stopped" => ChatEvent::Stopped,
                    "error" => ChatEvent::Error(event.data),
                    _ => continue,
                },
                Err(e) => ChatEvent::Error(e.to_string()),
            };
            if event_tx.send(event).is_err() {
                break;
            }
        }
        Ok(())
    }

    /// Ask the server to stop the active response for `chat_id`
    pub async fn stop(&self, chat_id: &str) -> Result<String> {
        let url = format!("{}/api/v1/stop", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id }))
            .send()
            .await?;

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if !status.is_success() {
            let reason = body["error"].as_str().unwrap_or("unknown error");
            anyhow::bail!("Stop failed ({}): {}", status, reason);
        }
        Ok(body["status"].as_str().unwrap_or_default().to_string())
    }

    pub async fn health(&self) -> Result<HealthReport> {
        let url = format!("{}/health", self.base_url);
        let report = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(report)
    }
}
