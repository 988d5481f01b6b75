//! HTTP API
//!
//! Three routes, mirroring the gRPC surface plus the consumer drain:
//!
//! - `POST /api/messages` submit a message
//! - `GET /api/stats` processed-message count
//! - `GET /api/consume` drain the subscriber buffer
//!
//! A malformed request body is rejected by the `Json` extractor before any
//! store mutation happens.

use crate::error::{RelayError, Result};
use crate::relay::Relay;
use crate::subscriber::MessageBuffer;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    pub buffer: Arc<MessageBuffer>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub content: String,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: String,
    /// Store id, stringified on the HTTP wire (gRPC keeps it numeric)
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub processed_messages: i64,
}

/// Buffered message as returned by the consume endpoint
///
/// Deserialization keeps only `content`; other keys in the topic payload
/// are dropped.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageContent {
    pub content: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.http_status(), Json(body)).into_response()
    }
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/messages", post(submit_message))
        .route("/api/stats", get(get_stats))
        .route("/api/consume", get(consume_messages))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serve the API until the shutdown future resolves
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = router(state);
    info!(%addr, "HTTP API listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Handler for POST /api/messages
async fn submit_message(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> std::result::Result<Json<SubmitResponse>, RelayError> {
    let submission = state.relay.submit_message(&request.content).await?;
    Ok(Json(SubmitResponse {
        status: submission.status.to_string(),
        id: submission.id.to_string(),
    }))
}

/// Handler for GET /api/stats
async fn get_stats(
    State(state): State<AppState>,
) -> std::result::Result<Json<StatsResponse>, RelayError> {
    let count = state.relay.processed_count().await?;
    Ok(Json(StatsResponse {
        processed_messages: count,
    }))
}

/// Handler for GET /api/consume
///
/// Drains the buffer and decodes each entry. Topic payloads come from this
/// service, so an undecodable entry is a server error, not the caller's.
async fn consume_messages(State(state): State<AppState>) -> Response {
    let entries = state.buffer.drain();

    let mut messages = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_slice::<MessageContent>(&entry.value) {
            Ok(content) => messages.push(content),
            Err(e) => {
                error!(key = %entry.key, error = %e, "Failed to decode buffered message");
                let body = ErrorBody {
                    error: "failed to decode buffered message".to_string(),
                };
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        }
    }

    Json(messages).into_response()
}

/// Handler for /health
async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
