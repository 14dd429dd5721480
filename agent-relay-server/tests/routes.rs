use agent_relay_core::config::{Config, SignalBackend};
use agent_relay_core::signal::{MemorySignalStore, RedisSignalStore, SignalStore};
use agent_relay_providers::{
    GenerationParams, LLMProvider, LLMResponse, LLMStreamEvent, Message, ProviderError,
    ProviderEventStream, ProviderResult,
};
use agent_relay_server::{build_router, AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

/// Streams "Hi", " there", "!" on every call
struct GreetingProvider;

#[async_trait]
impl LLMProvider for GreetingProvider {
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
        let mut events: Vec<ProviderResult<LLMStreamEvent>> = ["Hi", " there", "!"]
            .iter()
            .map(|t| Ok(LLMStreamEvent::TextDelta(t.to_string())))
            .collect();
        events.push(Ok(LLMStreamEvent::Completed(LLMResponse {
            content: Some("Hi there!".to_string()),
            tool_calls: Vec::new(),
            finish_reason: "stop".to_string(),
            usage: HashMap::new(),
        })));
        Ok(Box::pin(futures::stream::iter(events)))
    }

    fn get_default_model(&self) -> String {
        "greeting".to_string()
    }
}

struct BrokenProvider;

#[async_trait]
impl LLMProvider for BrokenProvider {
    async fn chat(
        &self,
        _messages: Vec<Message>,
        _tools: Option<Vec<serde_json::Value>>,
        _params: &GenerationParams,
    ) -> ProviderResult<LLMResponse> {
        Err(ProviderError::ApiError("HTTP 500: upstream down".to_string()))
    }

    fn get_default_model(&self) -> String {
        "broken".to_string()
    }
}

struct TestApp {
    router: Router,
    _dir: tempfile::TempDir,
}

fn test_config(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.signal.backend = SignalBackend::Memory;
    config.session.dir = dir.path().join("sessions").display().to_string();
    config.server.static_dir = dir.path().join("static").display().to_string();
    config.stream.poll_delay_ms = 0;
    config
}

fn app_with(provider: Arc<dyn LLMProvider>, store: Arc<dyn SignalStore>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    TestApp {
        router: build_router(AppState::new(config, provider, store)),
        _dir: dir,
    }
}

fn app() -> TestApp {
    app_with(Arc::new(GreetingProvider), Arc::new(MemorySignalStore::default()))
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn chat_streams_deltas() {
    let app = app();
    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/chat",
            serde_json::json!({ "chat_id": "c1", "message": "hello" }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    let body = body_text(response).await;
    assert!(body.contains("event: delta\ndata: Hi\n\n"));
    assert!(body.contains("event: delta\ndata:  there\n\n"));
    assert!(body.contains("event: delta\ndata: !\n\n"));
    assert!(!body.contains("[STOPPED]"));
}

#[tokio::test]
async fn stop_before_chat_yields_only_stopped() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/stop", serde_json::json!({ "chat_id": "c2" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "stop_requested");

    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/chat",
            serde_json::json!({ "chat_id": "c2", "message": "hello" }),
        ))
        .await
        .unwrap();
    let body = body_text(response).await;
    assert!(body.contains("event: stopped\ndata: [STOPPED]"));
    assert!(!body.contains("event: delta"));
}

#[tokio::test]
async fn stop_rejects_empty_chat_id() {
    let app = app();
    let response = app
        .router
        .oneshot(post_json("/api/v1/stop", serde_json::json!({ "chat_id": "  " })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn stop_reports_unavailable_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut signal = test_config(&dir).signal;
    signal.host = "127.0.0.1".to_string();
    signal.port = 1;
    signal.timeout_ms = 200;
    let store = Arc::new(RedisSignalStore::new(&signal).unwrap());
    let app = app_with(Arc::new(GreetingProvider), store);

    let response = app
        .router
        .clone()
        .oneshot(post_json("/api/v1/stop", serde_json::json!({ "chat_id": "c1" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["redis"], "disconnected");
}

#[tokio::test]
async fn chat_reports_generation_failure() {
    let app = app_with(Arc::new(BrokenProvider), Arc::new(MemorySignalStore::default()));
    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/chat",
            serde_json::json!({ "chat_id": "c1", "message": "hello" }),
        ))
        .await
        .unwrap();
    let body = body_text(response).await;
    assert!(body.contains("event: error\ndata: Provider error"));
}

#[tokio::test]
async fn chat_rejects_empty_message() {
    let app = app();
    let response = app
        .router
        .oneshot(post_json(
            "/api/v1/chat",
            serde_json::json!({ "chat_id": "c1", "message": "" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_replays_turns() {
    let app = app();
    let response = app.router.clone().oneshot(get("/api/v1/sessions/c1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/v1/chat",
            serde_json::json!({ "chat_id": "c1", "message": "hello" }),
        ))
        .await
        .unwrap();
    body_text(response).await;

    let response = app.router.oneshot(get("/api/v1/sessions/c1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = body_json(response).await;
    assert_eq!(session["chat_id"], "c1");
    let turns = session["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["content"], "Hi there!");
}

#[tokio::test]
async fn health_reports_memory_store_connected() {
    let app = app();
    let response = app.router.oneshot(get("/health")).await.unwrap();
    let health = body_json(response).await;
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["redis"], "connected");
}

#[tokio::test]
async fn serves_static_index() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&dir);
    std::fs::create_dir_all(&config.server.static_dir).unwrap();
    std::fs::write(
        std::path::Path::new(&config.server.static_dir).join("index.html"),
        "<h1>relay</h1>",
    )
    .unwrap();
    let router = build_router(AppState::new(
        config,
        Arc::new(GreetingProvider),
        Arc::new(MemorySignalStore::default()),
    ));

    let response = router.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "<h1>relay</h1>");
}
