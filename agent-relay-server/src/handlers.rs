use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;

use agent_relay_agent::ResponseFragment;

use crate::state::{
    AppState, ChatRequest, ErrorResponse, HealthResponse, SessionResponse, StopRequest,
    StopResponse,
};

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, Response> {
    let chat_id = payload.chat_id.trim();
    if chat_id.is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "chat_id is required"));
    }
    if payload.message.trim().is_empty() {
        return Err(error_response(StatusCode::BAD_REQUEST, "message is required"));
    }

    let stream = state
        .orchestrator
        .stream_response(chat_id, &payload.message)
        .map(|fragment| {
            let evt = match fragment {
                Ok(ResponseFragment::Content(text)) => Event::default().event("delta").data(text),
                Ok(fragment @ ResponseFragment::Stopped) => {
                    Event::default().event("stopped").data(fragment.as_text())
                }
                Err(e) => Event::default().event("error").data(e.to_string()),
            };
            Ok(evt)
        });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn stop_handler(
    State(state): State<AppState>,
    Json(payload): Json<StopRequest>,
) -> Response {
    let chat_id = payload.chat_id.trim();
    if chat_id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "chat_id is required");
    }

    match state.store.set_stop(chat_id).await {
        Ok(()) => {
            tracing::info!("chat_id=<{}> | Stop requested", chat_id);
            Json(StopResponse {
                status: "stop_requested".to_string(),
            })
            .into_response()
        }
        Err(e) => {
            tracing::error!("chat_id=<{}> | Failed to record stop request: {}", chat_id, e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

pub async fn session_handler(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> Response {
    if !state.sessions.exists(&chat_id) {
        return error_response(StatusCode::NOT_FOUND, format!("no session for {}", chat_id));
    }
    let session = state.sessions.load(&chat_id);
    Json(SessionResponse {
        chat_id,
        turns: session.messages,
    })
    .into_response()
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let reachable = state.store.ping().await;
    if !reachable {
        tracing::warn!(
            "Signal store ({}) is unreachable",
            state.store.backend_name()
        );
    }
    Json(HealthResponse::from_ping(reachable))
}
