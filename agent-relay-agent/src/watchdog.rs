//! Stop watchdog: observes the signal store on behalf of one stream

use agent_relay_core::signal::SignalStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Lifecycle of a watched stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Output flows; each check consults the store
    Running,
    /// A stop was observed; sticky until the stream terminates
    Stopping,
    /// The stream is over; no more checks are issued
    Terminated,
}

/// Per-stream stop detector.
///
/// Once a stop has been observed the watchdog never queries the store
/// again. Store failures count as "no stop" so an unreachable store
/// cannot break a response.
pub struct StopWatchdog {
    chat_id: String,
    store: Arc<dyn SignalStore>,
    state: WatchState,
}

impl StopWatchdog {
    pub fn new(chat_id: impl Into<String>, store: Arc<dyn SignalStore>) -> Self {
        Self {
            chat_id: chat_id.into(),
            store,
            state: WatchState::Running,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    /// Whether the stream must stop before its next fragment
    pub async fn should_stop(&mut self) -> bool {
        match self.state {
            WatchState::Stopping => true,
            WatchState::Terminated => false,
            WatchState::Running => match self.store.check_stop(&self.chat_id).await {
                Ok(true) => {
                    info!("chat_id=<{}> | Stop signal observed", self.chat_id);
                    self.state = WatchState::Stopping;
                    true
                }
                Ok(false) => false,
                Err(e) => {
                    warn!(
                        "chat_id=<{}> | Stop check failed, continuing: {}",
                        self.chat_id, e
                    );
                    false
                }
            },
        }
    }

    /// Set the local stop flag without consulting the store
    pub fn request_stop(&mut self) {
        if self.state == WatchState::Running {
            self.state = WatchState::Stopping;
        }
    }

    pub fn terminate(&mut self) {
        self.state = WatchState::Terminated;
    }
}
