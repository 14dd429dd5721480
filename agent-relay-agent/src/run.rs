//! Agent runs: the chunked generation behind a response stream

use crate::context::ContextBuilder;
use crate::error::Result;
use crate::event::AgentEvent;
use agent_relay_core::config::Config;
use agent_relay_core::session::{ChatMessage, SessionManager};
use agent_relay_providers::{
    GenerationParams, LLMProvider, LLMResponse, LLMStreamEvent, Message, ProviderEventStream,
};
use agent_relay_tools::{StopTool, ToolRegistry};
use async_trait::async_trait;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A lazy, finite, non-restartable source of agent events that can be
/// told to stop early.
#[async_trait]
pub trait Generation: Send {
    /// Pull the next event; `None` once the run is over
    async fn next_event(&mut self) -> Option<Result<AgentEvent>>;

    /// Stop producing output. After a halt `next_event` returns `None`.
    async fn halt(&mut self, reason: &str) -> Result<()>;
}

/// Long-lived agent settings shared by every run
pub struct Agent {
    provider: Arc<dyn LLMProvider>,
    sessions: Arc<SessionManager>,
    context: ContextBuilder,
    params: GenerationParams,
    max_iterations: u32,
    max_history: usize,
}

impl Agent {
    /// Create an agent from the loaded configuration
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        sessions: Arc<SessionManager>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            sessions,
            context: ContextBuilder::new(config.agent.system_prompt.clone()),
            params: GenerationParams::from(&config.model),
            max_iterations: config.agent.max_tool_iterations.max(1),
            max_history: config.session.max_history,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Prepare a run for one message. Nothing is sent or written until the
    /// first event is pulled.
    pub fn start(&self, chat_id: &str, message: &str) -> AgentRun {
        let history = self.sessions.history(chat_id, self.max_history);
        let messages = self.context.build_messages(history, message, chat_id);

        let stop_tool = Arc::new(StopTool::new(CancellationToken::new()));
        let mut tools = ToolRegistry::new();
        tools.register(stop_tool.clone());

        AgentRun {
            chat_id: chat_id.to_string(),
            user_message: message.to_string(),
            provider: self.provider.clone(),
            sessions: self.sessions.clone(),
            context: self.context.clone(),
            params: self.params.clone(),
            max_iterations: self.max_iterations,
            messages,
            tools,
            stop_tool,
            stream: None,
            pending: VecDeque::new(),
            iteration: 0,
            round_text: String::new(),
            reply: String::new(),
            user_saved: false,
            finished: false,
        }
    }
}

/// One message's worth of agent work.
///
/// Each round streams a provider completion, runs requested tool calls and
/// feeds their results back, until the model answers without tools, the
/// `stop` tool is invoked, or the round limit is reached.
pub struct AgentRun {
    chat_id: String,
    user_message: String,
    provider: Arc<dyn LLMProvider>,
    sessions: Arc<SessionManager>,
    context: ContextBuilder,
    params: GenerationParams,
    max_iterations: u32,
    messages: Vec<Message>,
    tools: ToolRegistry,
    stop_tool: Arc<StopTool>,
    stream: Option<ProviderEventStream>,
    pending: VecDeque<AgentEvent>,
    iteration: u32,
    /// Text streamed in the current round
    round_text: String,
    /// Text streamed across all rounds
    reply: String,
    user_saved: bool,
    finished: bool,
}

impl AgentRun {
    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Token cancelled when the run is halted or the agent calls `stop`
    pub fn stop_token(&self) -> &CancellationToken {
        self.stop_tool.token()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn persist_user_turn(&mut self) -> Result<()> {
        if !self.user_saved {
            self.sessions
                .append(&self.chat_id, ChatMessage::user(self.user_message.clone()))?;
            self.user_saved = true;
        }
        Ok(())
    }

    async fn start_round(&mut self) -> Result<AgentEvent> {
        self.persist_user_turn()?;
        self.iteration += 1;
        debug!(
            "chat_id=<{}> | Agent iteration {}/{}",
            self.chat_id, self.iteration, self.max_iterations
        );

        let tool_defs = self.tools.definitions();
        let stream = self
            .provider
            .chat_stream(
                self.messages.clone(),
                (!tool_defs.is_empty()).then_some(tool_defs),
                &self.params,
            )
            .await?;
        self.stream = Some(stream);
        self.round_text.clear();

        Ok(AgentEvent::IterationStarted {
            index: self.iteration,
            max_iterations: self.max_iterations,
        })
    }

    async fn finish_round(&mut self, response: LLMResponse) -> Result<()> {
        self.stream = None;

        if !response.has_tool_calls() {
            // Providers that skip deltas still owe the client the text
            if self.round_text.is_empty() {
                if let Some(content) = response.content.filter(|c| !c.is_empty()) {
                    self.reply.push_str(&content);
                    self.pending
                        .push_back(AgentEvent::AssistantDelta { text: content });
                }
            }
            return self.complete(false);
        }

        info!(
            "chat_id=<{}> | LLM requested {} tool calls",
            self.chat_id,
            response.tool_calls.len()
        );
        let content = (!self.round_text.is_empty()).then(|| self.round_text.clone());
        self.context.add_assistant_message(
            &mut self.messages,
            content,
            Some(response.tool_calls.clone()),
        );

        for tool_call in &response.tool_calls {
            let args = serde_json::to_value(&tool_call.arguments)
                .unwrap_or_else(|_| serde_json::Value::Object(serde_json::Map::new()));
            let args_preview: String = args.to_string().chars().take(200).collect();
            info!(
                "chat_id=<{}> | Tool call: {}({})",
                self.chat_id, tool_call.name, args_preview
            );
            self.pending.push_back(AgentEvent::ToolCallStarted {
                name: tool_call.name.clone(),
                args_preview,
                call_id: tool_call.id.clone(),
            });

            let result = self.tools.execute(&tool_call.name, args).await;
            self.pending.push_back(AgentEvent::ToolCallFinished {
                name: tool_call.name.clone(),
                is_error: result.starts_with("Error"),
                result: result.clone(),
                call_id: tool_call.id.clone(),
            });
            self.context
                .add_tool_result(&mut self.messages, tool_call.id.clone(), result);
        }
        Ok(())
    }

    fn complete(&mut self, stopped: bool) -> Result<()> {
        self.finished = true;
        let mut turn = ChatMessage::assistant(self.reply.clone());
        if stopped {
            turn = turn.stopped();
        }
        self.sessions.append(&self.chat_id, turn)?;

        let preview: String = self.reply.chars().take(120).collect();
        info!("chat_id=<{}> | Response: {}", self.chat_id, preview);
        self.pending.push_back(AgentEvent::FinalResponse {
            content: self.reply.clone(),
        });
        Ok(())
    }

    fn fail<E: Into<crate::AgentError>>(&mut self, err: E) -> Option<Result<AgentEvent>> {
        self.finished = true;
        self.stream = None;
        Some(Err(err.into()))
    }
}

#[async_trait]
impl Generation for AgentRun {
    async fn next_event(&mut self) -> Option<Result<AgentEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(Ok(event));
            }
            if self.finished {
                return None;
            }

            let Some(stream) = self.stream.as_mut() else {
                if self.stop_tool.is_stopped() {
                    info!("chat_id=<{}> | Agent invoked the stop tool", self.chat_id);
                    if let Err(e) = self.complete(true) {
                        return self.fail(e);
                    }
                    continue;
                }
                if self.iteration >= self.max_iterations {
                    warn!(
                        "chat_id=<{}> | Reached {} tool iterations, ending run",
                        self.chat_id, self.max_iterations
                    );
                    if let Err(e) = self.complete(false) {
                        return self.fail(e);
                    }
                    continue;
                }
                return match self.start_round().await {
                    Ok(event) => Some(Ok(event)),
                    Err(e) => self.fail(e),
                };
            };

            match stream.next().await {
                Some(Ok(LLMStreamEvent::TextDelta(text))) => {
                    self.round_text.push_str(&text);
                    self.reply.push_str(&text);
                    return Some(Ok(AgentEvent::AssistantDelta { text }));
                }
                Some(Ok(LLMStreamEvent::ToolCallDelta { index, name, .. })) => {
                    debug!(
                        "chat_id=<{}> | Tool call delta #{} {:?}",
                        self.chat_id, index, name
                    );
                }
                Some(Ok(LLMStreamEvent::Completed(response))) => {
                    if let Err(e) = self.finish_round(response).await {
                        return self.fail(e);
                    }
                }
                Some(Err(e)) => return self.fail(e),
                None => {
                    let response = LLMResponse {
                        content: None,
                        tool_calls: Vec::new(),
                        finish_reason: "stop".to_string(),
                        usage: Default::default(),
                    };
                    if let Err(e) = self.finish_round(response).await {
                        return self.fail(e);
                    }
                }
            }
        }
    }

    async fn halt(&mut self, reason: &str) -> Result<()> {
        self.stop_tool.stop(reason);
        // Dropping the provider stream aborts the request
        self.stream = None;
        self.pending.clear();
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.persist_user_turn()?;
        self.sessions.append(
            &self.chat_id,
            ChatMessage::assistant(self.reply.clone()).stopped(),
        )?;
        info!(
            "chat_id=<{}> | Run halted after {} chars: {}",
            self.chat_id,
            self.reply.chars().count(),
            reason
        );
        Ok(())
    }
}
