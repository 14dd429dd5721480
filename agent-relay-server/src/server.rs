use axum::{
    routing::{get, post},
    Router,
};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::handlers::{chat_handler, health_handler, session_handler, stop_handler};
use crate::state::AppState;

/// API routes plus static files; API routes take precedence
pub fn build_router(state: AppState) -> Router {
    let static_files =
        ServeDir::new(&state.config.server.static_dir).append_index_html_on_directories(true);

    Router::new()
        .route("/api/v1/chat", post(chat_handler))
        .route("/api/v1/stop", post(stop_handler))
        .route("/api/v1/sessions/:chat_id", get(session_handler))
        .route("/health", get(health_handler))
        .fallback_service(static_files)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(
    state: AppState,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let store = state.store.clone();

    if store.ping().await {
        tracing::info!("Signal store ({}) connected", store.backend_name());
    } else {
        tracing::warn!(
            "Signal store ({}) unreachable, stop requests will fail until it recovers",
            store.backend_name()
        );
    }

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            tracing::info!("Server shutting down signal received");
        })
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}
