//! Cancellable response pipeline
//!
//! Interleaves a [`Generation`] with a [`StopWatchdog`] in a single
//! cooperative stream. Before every pull from the generation the watchdog
//! is consulted; when it reports a stop the generation is halted and one
//! terminal [`ResponseFragment::Stopped`] is emitted.

use crate::error::AgentError;
use crate::event::AgentEvent;
use crate::fragment::ResponseFragment;
use crate::run::Generation;
use crate::watchdog::StopWatchdog;
use agent_relay_core::signal::SignalStore;
use futures::stream::{self, Stream};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Fragments of one response; `Stopped` or an error is always last
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<ResponseFragment, AgentError>> + Send>>;

/// Tuning for one pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Pause after each agent event
    pub poll_delay: Duration,
    /// Remove the stop signal when the stream ends
    pub clear_on_finish: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            poll_delay: Duration::from_millis(10),
            clear_on_finish: true,
        }
    }
}

struct PipelineState<G: Generation + 'static> {
    /// Taken by `Drop` when the stream is abandoned mid-flight
    generation: Option<G>,
    watchdog: StopWatchdog,
    store: Arc<dyn SignalStore>,
    options: PipelineOptions,
    done: bool,
}

impl<G: Generation + 'static> PipelineState<G> {
    async fn finish(&mut self) {
        self.done = true;
        self.watchdog.terminate();
        if !self.options.clear_on_finish {
            return;
        }
        let chat_id = self.watchdog.chat_id();
        if let Err(e) = self.store.clear_stop(chat_id).await {
            warn!("chat_id=<{}> | Failed to clear stop signal: {}", chat_id, e);
        }
    }

    async fn stop(&mut self) -> ResponseFragment {
        let chat_id = self.watchdog.chat_id().to_string();
        if let Some(generation) = self.generation.as_mut() {
            if let Err(e) = generation.halt("stop requested").await {
                warn!("chat_id=<{}> | Halt failed, stopping anyway: {}", chat_id, e);
            }
        }
        self.finish().await;
        info!("chat_id=<{}> | Response stopped", chat_id);
        ResponseFragment::Stopped
    }
}

impl<G: Generation + 'static> Drop for PipelineState<G> {
    /// A stream dropped before it finished (client went away) still halts
    /// its generation and clears the signal, on a detached task.
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let Some(mut generation) = self.generation.take() else {
            return;
        };
        let chat_id = self.watchdog.chat_id().to_string();
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(
                "chat_id=<{}> | Response abandoned outside a runtime, skipping cleanup",
                chat_id
            );
            return;
        };

        let store = self.store.clone();
        let clear = self.options.clear_on_finish;
        info!("chat_id=<{}> | Response abandoned by client", chat_id);
        handle.spawn(async move {
            if let Err(e) = generation.halt("client disconnected").await {
                warn!("chat_id=<{}> | Halt after disconnect failed: {}", chat_id, e);
            }
            if clear {
                if let Err(e) = store.clear_stop(&chat_id).await {
                    warn!("chat_id=<{}> | Failed to clear stop signal: {}", chat_id, e);
                }
            }
        });
    }
}

fn log_event(chat_id: &str, event: &AgentEvent) {
    match event {
        AgentEvent::AssistantDelta { text } => {
            debug!("chat_id=<{}> | Event: delta ({} chars)", chat_id, text.len())
        }
        AgentEvent::FinalResponse { content } => {
            info!(
                "chat_id=<{}> | Event: final response ({} chars)",
                chat_id,
                content.chars().count()
            )
        }
        other => info!("chat_id=<{}> | Event: {:?}", chat_id, other),
    }
}

/// Wrap a generation in a stop-aware fragment stream.
///
/// Nothing runs until the stream is polled and no task is spawned while
/// it is consumed. Dropping it early halts the generation in the background.
pub fn cancellable_stream<G>(
    generation: G,
    watchdog: StopWatchdog,
    store: Arc<dyn SignalStore>,
    options: PipelineOptions,
) -> FragmentStream
where
    G: Generation + 'static,
{
    let state = PipelineState {
        generation: Some(generation),
        watchdog,
        store,
        options,
        done: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.done {
                return None;
            }

            if state.watchdog.should_stop().await {
                let fragment = state.stop().await;
                return Some((Ok(fragment), state));
            }

            let Some(generation) = state.generation.as_mut() else {
                return None;
            };
            match generation.next_event().await {
                None => {
                    state.finish().await;
                    return None;
                }
                Some(Err(e)) => {
                    error!(
                        "chat_id=<{}> | Generation failed: {}",
                        state.watchdog.chat_id(),
                        e
                    );
                    state.finish().await;
                    return Some((Err(e), state));
                }
                Some(Ok(event)) => {
                    log_event(state.watchdog.chat_id(), &event);
                    if !state.options.poll_delay.is_zero() {
                        tokio::time::sleep(state.options.poll_delay).await;
                    }
                    if let Some(text) = event.into_text() {
                        return Some((Ok(ResponseFragment::Content(text)), state));
                    }
                }
            }
        }
    }))
}
