//! Test doubles shared by the unit tests

use crate::event::AgentEvent;
use crate::pipeline::FragmentStream;
use crate::run::Generation;
use agent_relay_core::signal::{MemorySignalStore, SignalStore};
use agent_relay_providers::{
    GenerationParams, LLMProvider, LLMResponse, LLMStreamEvent, Message, ProviderError,
    ProviderEventStream, ProviderResult,
};
use async_trait::async_trait;
use futures::{stream, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Provider that replays one scripted round per streaming call
pub struct ScriptedProvider {
    rounds: Mutex<VecDeque<Vec<LLMStreamEvent>>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn rounds(rounds: Vec<Vec<LLMStreamEvent>>) -> Self {
        Self {
            rounds: Mutex::new(rounds.into()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A single round streaming `chunks` then completing
    pub fn text(chunks: &[&str]) -> Self {
        Self::rounds(vec![text_round(chunks)])
    }

    /// One text round per streaming call
    pub fn texts(rounds: &[&[&str]]) -> Self {
        Self::rounds(rounds.iter().map(|chunks| text_round(chunks)).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn text_round(chunks: &[&str]) -> Vec<LLMStreamEvent> {
    let mut round: Vec<LLMStreamEvent> = chunks
        .iter()
        .map(|c| LLMStreamEvent::TextDelta(c.to_string()))
        .collect();
    round.push(LLMStreamEvent::Completed(LLMResponse {
        content: Some(chunks.concat()),
        tool_calls: Vec::new(),
        finish_reason: "stop".to_string(),
        usage: HashMap::new(),
    }));
    round
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Option<Vec<serde_json::Value>>,
        _params: &GenerationParams,
    ) -> ProviderResult<LLMResponse> {
        Err(ProviderError::InvalidResponse("streaming only".to_string()))
    }

    async fn chat_stream(
        &self,
        _messages: Vec<Message>,
        _tools: Option<Vec<serde_json::Value>>,
        _params: &GenerationParams,
    ) -> ProviderResult<ProviderEventStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let round = self
            .rounds
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::ApiError("script exhausted".to_string()))?;
        Ok(Box::pin(stream::iter(round.into_iter().map(Ok))))
    }

    fn get_default_model(&self) -> String {
        "scripted".to_string()
    }
}

/// In-memory store that counts reads and clears
pub struct CountingStore {
    inner: MemorySignalStore,
    checks: AtomicUsize,
    clears: AtomicUsize,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemorySignalStore::default(),
            checks: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SignalStore for CountingStore {
    async fn set_stop(&self, chat_id: &str) -> agent_relay_core::Result<()> {
        self.inner.set_stop(chat_id).await
    }

    async fn check_stop(&self, chat_id: &str) -> agent_relay_core::Result<bool> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.inner.check_stop(chat_id).await
    }

    async fn clear_stop(&self, chat_id: &str) -> agent_relay_core::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.inner.clear_stop(chat_id).await
    }

    async fn ping(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

/// Store that is never reachable
pub struct FailingStore;

#[async_trait]
impl SignalStore for FailingStore {
    async fn set_stop(&self, _chat_id: &str) -> agent_relay_core::Result<()> {
        Err(agent_relay_core::Error::Signal("connection refused".to_string()))
    }

    async fn check_stop(&self, _chat_id: &str) -> agent_relay_core::Result<bool> {
        Err(agent_relay_core::Error::Signal("connection refused".to_string()))
    }

    async fn clear_stop(&self, _chat_id: &str) -> agent_relay_core::Result<()> {
        Err(agent_relay_core::Error::Signal("connection refused".to_string()))
    }

    async fn ping(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "failing"
    }
}

/// Drain a generation, panicking on errors
pub async fn collect_events<G: Generation>(generation: &mut G) -> Vec<AgentEvent> {
    let mut events = Vec::new();
    while let Some(event) = generation.next_event().await {
        events.push(event.unwrap());
    }
    events
}

/// Drain a fragment stream into its text, panicking on errors
pub async fn collect_fragments(stream: FragmentStream) -> Vec<String> {
    stream
        .map(|fragment| fragment.unwrap().as_text().to_string())
        .collect()
        .await
}
