//! Base trait for LLM providers

use agent_relay_core::config::ModelConfig;
use async_trait::async_trait;
use futures::stream::{self, Stream};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::pin::Pin;
use thiserror::Error;

/// Error type for provider operations
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type ProviderResult<T> = Result<T, ProviderError>;

pub type ProviderEventStream = Pin<Box<dyn Stream<Item = ProviderResult<LLMStreamEvent>> + Send>>;

/// Sampling parameters for one generation
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    /// Overrides the provider's default model when set
    pub model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
}

impl From<&ModelConfig> for GenerationParams {
    fn from(config: &ModelConfig) -> Self {
        Self {
            model: Some(config.model.clone()),
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            top_p: Some(config.top_p),
            top_k: config.top_k,
        }
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self::from(&ModelConfig::default())
    }
}

/// A tool call request from the LLM
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub call_type: String,
    pub name: String,
    pub arguments: HashMap<String, serde_json::Value>,
}

impl Serialize for ToolCallRequest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;

        #[derive(Serialize)]
        struct Function<'a> {
            name: &'a str,
            arguments: String,
        }

        // Chat completions expect arguments as a JSON-encoded string.
        let arguments = serde_json::to_string(&self.arguments).unwrap_or_else(|_| "{}".to_string());

        let mut state = serializer.serialize_struct("ToolCallRequest", 3)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("type", &self.call_type)?;
        state.serialize_field(
            "function",
            &Function {
                name: &self.name,
                arguments,
            },
        )?;
        state.end()
    }
}

/// Response from an LLM provider
#[derive(Debug, Clone)]
pub struct LLMResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub finish_reason: String,
    pub usage: HashMap<String, i64>,
}

impl LLMResponse {
    /// Check if response contains tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Streaming event emitted by LLM providers
#[derive(Debug, Clone)]
pub enum LLMStreamEvent {
    /// Incremental assistant text output
    TextDelta(String),
    /// Incremental tool-call arguments
    ToolCallDelta {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments_delta: Option<String>,
    },
    /// Final completed response
    Completed(LLMResponse),
}

/// A message in the chat conversation
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
}

impl Message {
    fn with_role(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role("user", content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role("system", content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role("assistant", content)
    }

    /// Create a tool response message
    pub fn tool(content: impl Into<String>, tool_call_id: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_role("tool", content)
        }
    }
}

/// Trait for LLM providers
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a chat completion request
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<serde_json::Value>>,
        params: &GenerationParams,
    ) -> ProviderResult<LLMResponse>;

    /// Send a streaming chat completion request.
    ///
    /// Default behavior falls back to non-streaming chat and emits one text delta.
    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<serde_json::Value>>,
        params: &GenerationParams,
    ) -> ProviderResult<ProviderEventStream> {
        let response = self.chat(messages, tools, params).await?;

        let mut events = Vec::new();
        if let Some(content) = response.content.clone() {
            if !content.is_empty() {
                events.push(Ok(LLMStreamEvent::TextDelta(content)));
            }
        }
        events.push(Ok(LLMStreamEvent::Completed(response)));

        Ok(Box::pin(stream::iter(events)))
    }

    /// Get the default model for this provider
    fn get_default_model(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct EchoProvider;

    #[async_trait]
    impl LLMProvider for EchoProvider {
        async fn chat(
            &self,
            messages: Vec<Message>,
            _tools: Option<Vec<serde_json::Value>>,
            _params: &GenerationParams,
        ) -> ProviderResult<LLMResponse> {
            Ok(LLMResponse {
                content: messages.last().map(|m| m.content.clone()),
                tool_calls: Vec::new(),
                finish_reason: "stop".to_string(),
                usage: HashMap::new(),
            })
        }

        fn get_default_model(&self) -> String {
            "echo".to_string()
        }
    }

    #[tokio::test]
    async fn test_default_chat_stream_falls_back_to_chat() {
        let mut stream = EchoProvider
            .chat_stream(vec![Message::user("ping")], None, &GenerationParams::default())
            .await
            .unwrap();

        match stream.next().await {
            Some(Ok(LLMStreamEvent::TextDelta(text))) => assert_eq!(text, "ping"),
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            stream.next().await,
            Some(Ok(LLMStreamEvent::Completed(_)))
        ));
        assert!(stream.next().await.is_none());
    }

    #[test]
    fn test_tool_call_serializes_arguments_as_string() {
        let call = ToolCallRequest {
            id: "call_1".to_string(),
            call_type: "function".to_string(),
            name: "stop".to_string(),
            arguments: HashMap::from([(
                "message".to_string(),
                serde_json::Value::String("bye".to_string()),
            )]),
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["function"]["name"], "stop");
        assert_eq!(value["function"]["arguments"], r#"{"message":"bye"}"#);
    }

    #[test]
    fn test_params_from_model_config() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 2048);
        assert_eq!(params.top_k, Some(40));
        assert_eq!(params.model.as_deref(), Some("gemini-2.5-flash"));
    }
}
