//! Entry point used by the HTTP layer to stream agent responses

use crate::pipeline::{cancellable_stream, FragmentStream, PipelineOptions};
use crate::run::{Agent, Generation};
use crate::watchdog::StopWatchdog;
use agent_relay_core::config::Config;
use agent_relay_core::session::SessionManager;
use agent_relay_core::signal::SignalStore;
use agent_relay_providers::LLMProvider;
use std::sync::Arc;
use tracing::info;

/// Streams agent responses that can be cut short through the signal store
#[derive(Clone)]
pub struct AgentOrchestrator {
    agent: Arc<Agent>,
    store: Arc<dyn SignalStore>,
    options: PipelineOptions,
}

impl AgentOrchestrator {
    pub fn new(agent: Arc<Agent>, store: Arc<dyn SignalStore>, options: PipelineOptions) -> Self {
        Self {
            agent,
            store,
            options,
        }
    }

    /// Wire an orchestrator from the loaded configuration
    pub fn from_config(
        provider: Arc<dyn LLMProvider>,
        sessions: Arc<SessionManager>,
        store: Arc<dyn SignalStore>,
        config: &Config,
    ) -> Self {
        let options = PipelineOptions {
            poll_delay: config.stream.poll_delay(),
            clear_on_finish: config.signal.clear_on_finish,
        };
        Self::new(Arc::new(Agent::new(provider, sessions, config)), store, options)
    }

    pub fn agent(&self) -> &Arc<Agent> {
        &self.agent
    }

    pub fn store(&self) -> &Arc<dyn SignalStore> {
        &self.store
    }

    /// Stream the agent's reply to `message`.
    ///
    /// The stream is lazy: the provider is not contacted until it is polled.
    pub fn stream_response(&self, chat_id: &str, message: &str) -> FragmentStream {
        let preview: String = message.chars().take(100).collect();
        info!("chat_id=<{}> | Processing message: {}", chat_id, preview);

        let run = self.agent.start(chat_id, message);
        self.stream_generation(chat_id, run)
    }

    /// Stream any generation under the stop watchdog
    pub fn stream_generation<G>(&self, chat_id: &str, generation: G) -> FragmentStream
    where
        G: Generation + 'static,
    {
        let watchdog = StopWatchdog::new(chat_id, self.store.clone());
        cancellable_stream(
            generation,
            watchdog,
            self.store.clone(),
            self.options.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{collect_fragments, CountingStore, FailingStore, ScriptedProvider};
    use crate::ResponseFragment;
    use futures::StreamExt;
    use std::time::Duration;

    struct Fixture {
        orchestrator: AgentOrchestrator,
        store: Arc<CountingStore>,
        provider: Arc<ScriptedProvider>,
        _dir: tempfile::TempDir,
    }

    fn fixture_with(provider: ScriptedProvider) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(provider);
        let store = Arc::new(CountingStore::new());
        let sessions = Arc::new(SessionManager::new(dir.path()));
        let mut config = Config::default();
        config.stream.poll_delay_ms = 0;
        let orchestrator =
            AgentOrchestrator::from_config(provider.clone(), sessions, store.clone(), &config);
        Fixture {
            orchestrator,
            store,
            provider,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(ScriptedProvider::text(&["Hi", " there", "!"]))
    }

    #[tokio::test]
    async fn test_c1_streams_without_stop() {
        let f = fixture();
        let fragments = collect_fragments(f.orchestrator.stream_response("c1", "hello")).await;

        assert_eq!(fragments, vec!["Hi", " there", "!"]);
        let history = f.orchestrator.agent().sessions().history("c1", 10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hi there!");
    }

    #[tokio::test]
    async fn test_c2_stop_before_start() {
        let f = fixture();
        f.store.set_stop("c2").await.unwrap();

        let fragments = collect_fragments(f.orchestrator.stream_response("c2", "hello")).await;

        assert_eq!(fragments, vec!["[STOPPED]"]);
        assert_eq!(f.provider.calls(), 0);
        assert_eq!(f.store.checks(), 1);
        assert!(!f.store.check_stop("c2").await.unwrap());
    }

    #[tokio::test]
    async fn test_c3_stop_after_two_fragments() {
        let f = fixture();
        let mut stream = f.orchestrator.stream_response("c3", "hello");

        assert_eq!(stream.next().await.unwrap().unwrap().as_text(), "Hi");
        assert_eq!(stream.next().await.unwrap().unwrap().as_text(), " there");
        f.store.set_stop("c3").await.unwrap();
        f.store.set_stop("c3").await.unwrap();

        assert_eq!(stream.next().await.unwrap().unwrap(), ResponseFragment::Stopped);
        assert!(stream.next().await.is_none());

        let history = f.orchestrator.agent().sessions().history("c3", 10);
        assert_eq!(history[1].content, "Hi there");
        assert!(history[1].stopped);
    }

    #[tokio::test]
    async fn test_signal_cleared_after_completion() {
        let f = fixture();
        let fragments = collect_fragments(f.orchestrator.stream_response("c1", "hello")).await;
        assert_eq!(fragments.len(), 3);
        assert_eq!(f.store.clears(), 1);
    }

    #[tokio::test]
    async fn test_stop_for_other_chat_is_ignored() {
        let f = fixture();
        f.store.set_stop("other").await.unwrap();
        let fragments = collect_fragments(f.orchestrator.stream_response("c1", "hello")).await;
        assert_eq!(fragments, vec!["Hi", " there", "!"]);
        assert!(f.store.check_stop("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_unreachable_store_does_not_break_stream() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(ScriptedProvider::text(&["Hi", " there", "!"]));
        let sessions = Arc::new(SessionManager::new(dir.path()));
        let orchestrator = AgentOrchestrator::new(
            Arc::new(Agent::new(provider, sessions, &Config::default())),
            Arc::new(FailingStore),
            PipelineOptions {
                poll_delay: Duration::from_millis(1),
                clear_on_finish: true,
            },
        );

        let fragments = collect_fragments(orchestrator.stream_response("c1", "hello")).await;
        assert_eq!(fragments, vec!["Hi", " there", "!"]);
    }

    #[tokio::test]
    async fn test_disconnect_persists_reply_and_clears_signal() {
        let f = fixture_with(ScriptedProvider::texts(&[&["Hi", " there", "!"], &["Next", "x"]]));
        let mut stream = f.orchestrator.stream_response("c9", "hello");
        assert_eq!(stream.next().await.unwrap().unwrap().as_text(), "Hi");
        drop(stream);
        f.store.set_stop("c9").await.unwrap();

        for _ in 0..100 {
            if f.store.clears() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(f.store.clears(), 1);

        let history = f.orchestrator.agent().sessions().history("c9", 10);
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Hi");
        assert!(history[1].stopped);

        let fragments = collect_fragments(f.orchestrator.stream_response("c9", "again")).await;
        assert_eq!(fragments, vec!["Next", "x"]);
    }
}
