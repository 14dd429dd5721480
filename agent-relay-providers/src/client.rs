//! Client for OpenAI-compatible chat completion endpoints
//!
//! Gemini, OpenAI and most self-hosted gateways expose
//! `POST {api_base}/chat/completions` with server-sent event streaming.

use agent_relay_core::config::ModelConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, warn};

use crate::base::{
    GenerationParams, LLMProvider, LLMResponse, LLMStreamEvent, Message, ProviderError,
    ProviderEventStream, ProviderResult, ToolCallRequest,
};

/// Chat completion request body
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
}

/// Non-streaming response body
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ToolCall {
    id: String,
    #[serde(rename = "type", default = "default_call_type")]
    call_type: String,
    function: Function,
}

#[derive(Debug, Deserialize)]
struct Function {
    name: String,
    arguments: String,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Debug, Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: i64,
    #[serde(default)]
    completion_tokens: i64,
    #[serde(default)]
    total_tokens: i64,
}

impl Usage {
    fn into_map(self) -> HashMap<String, i64> {
        HashMap::from([
            ("prompt_tokens".to_string(), self.prompt_tokens),
            ("completion_tokens".to_string(), self.completion_tokens),
            ("total_tokens".to_string(), self.total_tokens),
        ])
    }
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<StreamToolCall>,
}

#[derive(Debug, Deserialize)]
struct StreamToolCall {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    #[serde(default)]
    call_type: Option<String>,
    #[serde(default)]
    function: Option<StreamFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: Option<String>,
    call_type: String,
    name: String,
    arguments: String,
}

/// Parse tool arguments, keeping unparseable input under `raw`
fn parse_arguments(raw: &str) -> HashMap<String, serde_json::Value> {
    if raw.trim().is_empty() {
        return HashMap::new();
    }
    serde_json::from_str::<HashMap<String, serde_json::Value>>(raw).unwrap_or_else(|e| {
        warn!("Failed to parse tool call arguments: {}", e);
        HashMap::from([("raw".to_string(), serde_json::Value::String(raw.to_string()))])
    })
}

/// Accumulates deltas into the final response of a streamed completion
#[derive(Debug, Default)]
struct StreamAccumulator {
    content: String,
    finish_reason: Option<String>,
    usage: Option<Usage>,
    partial_calls: Vec<PartialToolCall>,
}

impl StreamAccumulator {
    /// Apply one decoded chunk and return the events it produces
    fn apply(&mut self, chunk: StreamChunk) -> Vec<LLMStreamEvent> {
        let mut events = Vec::new();
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }

        let Some(choice) = chunk.choices.into_iter().next() else {
            return events;
        };
        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
        }

        if let Some(text) = choice.delta.content {
            if !text.is_empty() {
                self.content.push_str(&text);
                events.push(LLMStreamEvent::TextDelta(text));
            }
        }

        for tool_call in choice.delta.tool_calls {
            let index = tool_call.index;
            if self.partial_calls.len() <= index {
                self.partial_calls
                    .resize_with(index + 1, PartialToolCall::default);
            }
            let entry = &mut self.partial_calls[index];
            if let Some(id) = tool_call.id {
                entry.id = Some(id);
            }
            if let Some(call_type) = tool_call.call_type {
                entry.call_type = call_type;
            }
            let Some(function) = tool_call.function else {
                continue;
            };
            if let Some(name) = function.name {
                entry.name.push_str(&name);
            }
            if let Some(arguments_delta) = function.arguments {
                entry.arguments.push_str(&arguments_delta);
                events.push(LLMStreamEvent::ToolCallDelta {
                    index,
                    id: entry.id.clone(),
                    name: (!entry.name.is_empty()).then(|| entry.name.clone()),
                    arguments_delta: Some(arguments_delta),
                });
            }
        }

        events
    }

    fn finish(self) -> LLMResponse {
        let tool_calls = self
            .partial_calls
            .into_iter()
            .enumerate()
            .filter(|(_, call)| !call.name.is_empty())
            .map(|(i, call)| ToolCallRequest {
                id: call.id.unwrap_or_else(|| format!("stream_tool_call_{}", i)),
                call_type: if call.call_type.is_empty() {
                    default_call_type()
                } else {
                    call.call_type
                },
                name: call.name,
                arguments: parse_arguments(&call.arguments),
            })
            .collect();

        LLMResponse {
            content: (!self.content.is_empty()).then_some(self.content),
            tool_calls,
            finish_reason: self.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: self.usage.map(Usage::into_map).unwrap_or_default(),
        }
    }
}

/// State threaded through the streaming response
struct SseState {
    response: reqwest::Response,
    buffer: Vec<u8>,
    pending: VecDeque<ProviderResult<LLMStreamEvent>>,
    accumulator: Option<StreamAccumulator>,
}

impl SseState {
    fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            accumulator: Some(StreamAccumulator::default()),
        }
    }

    fn is_finished(&self) -> bool {
        self.accumulator.is_none()
    }

    fn complete(&mut self) {
        if let Some(acc) = self.accumulator.take() {
            self.pending
                .push_back(Ok(LLMStreamEvent::Completed(acc.finish())));
        }
    }

    fn fail(&mut self, error: ProviderError) {
        if self.accumulator.take().is_some() {
            self.pending.push_back(Err(error));
        }
    }

    fn handle_payload(&mut self, payload: &str) {
        if payload == "[DONE]" {
            self.complete();
            return;
        }
        let Some(acc) = self.accumulator.as_mut() else {
            return;
        };
        match serde_json::from_str::<StreamChunk>(payload) {
            Ok(chunk) => {
                let events = acc.apply(chunk);
                self.pending.extend(events.into_iter().map(Ok));
            }
            Err(err) => self.fail(ProviderError::JsonError(err)),
        }
    }
}

/// Split complete server-sent events off the front of `buffer` and return
/// their joined `data:` payloads. Carriage returns must already be removed.
fn parse_sse_events(buffer: &mut Vec<u8>) -> Vec<String> {
    let mut events = Vec::new();
    while let Some(pos) = buffer.windows(2).position(|w| w == b"\n\n") {
        let raw: Vec<u8> = buffer.drain(..pos + 2).collect();
        let raw = String::from_utf8_lossy(&raw[..pos]);

        let data_lines: Vec<&str> = raw
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(str::trim)
            .collect();

        if !data_lines.is_empty() {
            events.push(data_lines.join("\n"));
        }
    }
    events
}

/// Provider client for OpenAI-compatible chat completion APIs
pub struct ChatCompletionsClient {
    client: Client,
    api_base: String,
    api_key: Option<String>,
    default_model: String,
    extra_headers: HashMap<String, String>,
}

impl ChatCompletionsClient {
    /// Create a new client
    pub fn new(
        api_key: Option<String>,
        api_base: impl Into<String>,
        default_model: impl Into<String>,
        extra_headers: Option<HashMap<String, String>>,
    ) -> Self {
        let api_base = api_base.into().trim().trim_end_matches('/').to_string();
        Self {
            client: Client::builder()
                .http1_only()
                .build()
                .unwrap_or_else(|_| Client::new()),
            api_base,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            default_model: default_model.into(),
            extra_headers: extra_headers.unwrap_or_default(),
        }
    }

    /// Create a client from the model section of the configuration
    pub fn from_config(config: &ModelConfig) -> Self {
        Self::new(
            Some(config.api_key.clone()),
            config.api_base.clone(),
            config.model.clone(),
            Some(config.extra_headers.clone()),
        )
    }

    fn build_request(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<serde_json::Value>>,
        params: &GenerationParams,
        stream: bool,
    ) -> ChatCompletionRequest {
        let tool_choice = tools.as_ref().map(|_| "auto".to_string());
        ChatCompletionRequest {
            model: params
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages,
            tools,
            tool_choice,
            stream: stream.then_some(true),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            top_p: params.top_p,
            top_k: params.top_k,
        }
    }

    async fn send(&self, request: &ChatCompletionRequest) -> ProviderResult<reqwest::Response> {
        let url = format!("{}/chat/completions", self.api_base);
        debug!(
            "Sending chat request to {} with model {} (stream: {})",
            self.api_base,
            request.model,
            request.stream.unwrap_or(false)
        );

        let mut req_builder = self.client.post(&url).json(request);
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }
        for (key, value) in &self.extra_headers {
            req_builder = req_builder.header(key, value);
        }

        let response = req_builder.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::ApiError(format!(
                "HTTP {}: {}",
                status, error_text
            )));
        }
        Ok(response)
    }

    fn parse_response(response: ChatCompletionResponse) -> ProviderResult<LLMResponse> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| ToolCallRequest {
                id: tc.id,
                call_type: tc.call_type,
                arguments: parse_arguments(&tc.function.arguments),
                name: tc.function.name,
            })
            .collect();

        Ok(LLMResponse {
            content: choice.message.content,
            tool_calls,
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            usage: response.usage.into_map(),
        })
    }
}

#[async_trait]
impl LLMProvider for ChatCompletionsClient {
    async fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<serde_json::Value>>,
        params: &GenerationParams,
    ) -> ProviderResult<LLMResponse> {
        let request = self.build_request(messages, tools, params, false);
        let response = self.send(&request).await?;
        let data: ChatCompletionResponse = response.json().await?;
        Self::parse_response(data)
    }

    async fn chat_stream(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<serde_json::Value>>,
        params: &GenerationParams,
    ) -> ProviderResult<ProviderEventStream> {
        let request = self.build_request(messages, tools, params, true);
        let response = self.send(&request).await?;

        // Reads happen only while the consumer polls; dropping the stream
        // drops the response and aborts the request.
        let stream = futures::stream::unfold(SseState::new(response), |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.is_finished() {
                    return None;
                }

                match state.response.chunk().await {
                    Ok(Some(bytes)) => {
                        state
                            .buffer
                            .extend(bytes.iter().copied().filter(|b| *b != b'\r'));
                        for payload in parse_sse_events(&mut state.buffer) {
                            state.handle_payload(&payload);
                        }
                    }
                    // Some servers close without sending [DONE]
                    Ok(None) => state.complete(),
                    Err(err) => state.fail(ProviderError::HttpError(err)),
                }
            }
        });

        Ok(Box::pin(stream))
    }

    fn get_default_model(&self) -> String {
        self.default_model.clone()
    }
}
