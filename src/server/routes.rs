//! HTTP route handlers for the chat API.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::chat::{ChatEvent, UserContent};

use super::error::AppError;
use super::state::AppState;

/// Interval between SSE keep-alive comments.
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Create the API router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/chat/", post(create_chat))
        .route("/api/v1/chat/{session_id}", delete(delete_chat))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "parley",
        "version": env!("CARGO_PKG_VERSION"),
        "db_readers_open": state.store.pool().open_readers(),
    }))
}

/// Chat creation request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// User message parts.
    pub parts: Vec<UserContent>,
}

/// Open a chat session and stream the reply as server-sent events.
async fn create_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.parts.is_empty() {
        return Err(AppError::Validation("parts must not be empty".to_string()));
    }

    let events = state
        .chat
        .create_session(request.parts)
        .map(|event| Ok::<_, Infallible>(sse_event(&event)));

    Ok((
        StatusCode::CREATED,
        [(header::CONNECTION, "keep-alive")],
        Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL)),
    ))
}

fn sse_event(event: &ChatEvent) -> Event {
    match event.data() {
        Ok(data) => Event::default().event(event.name()).data(data),
        Err(err) => Event::default().event("error").data(
            json!({ "session_id": event.session_id(), "message": err.to_string() }).to_string(),
        ),
    }
}

/// Accepted and ignored; sessions are not deleted over HTTP.
async fn delete_chat(Path(session_id): Path<Uuid>) -> StatusCode {
    tracing::debug!(%session_id, "Delete request ignored");
    StatusCode::ACCEPTED
}
