//! chatrag HTTP REST API
//!
//! Axum-based HTTP server exposing the chat pipeline. Runs alongside the Unix
//! socket IPC server on port 8766 (configurable).
//!
//! Each endpoint has a thin axum handler that delegates to an inner function
//! returning `(StatusCode, json)`; the inner functions build a
//! `ChatragRequest` and go through the same router as IPC.
//!
//! Endpoints:
//! - GET    /health                  : health check
//! - GET    /version                 : server version info
//! - POST   /chats/:id/turn          : answer the latest message
//! - POST   /chats/:id/ingest        : store text for a conversation
//! - POST   /chats/:id/retrieve      : conversation-scoped search
//! - POST   /chats/:id/attachments   : queue document attachments
//! - DELETE /chats/:id/vectors       : purge on conversation delete
//! - POST   /titles                  : generate a conversation title

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chatrag_core::index::Metadata;
use chatrag_core::ipc::{ChatragRequest, ChatragResponse, PROTOCOL_VERSION};
use chatrag_core::models::ChatMessage;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::services::RagServices;

/// Build the Axum router with all endpoints
pub fn build_router(services: Arc<RagServices>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        .route("/chats/:id/turn", post(turn_handler))
        .route("/chats/:id/ingest", post(ingest_handler))
        .route("/chats/:id/retrieve", post(retrieve_handler))
        .route("/chats/:id/attachments", post(attachments_handler))
        .route("/chats/:id/vectors", delete(purge_handler))
        .route("/titles", post(title_handler))
        .with_state(services)
}

/// Start the HTTP server on the configured address.
/// Gracefully shuts down when the broadcast shutdown signal fires.
pub async fn start_http_server(
    services: Arc<RagServices>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("{}:{}", services.config.http.host, services.config.http.port);

    let app = build_router(services);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("chatrag HTTP API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("HTTP server shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TurnBody {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct IngestBody {
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

#[derive(Debug, Deserialize)]
pub struct RetrieveBody {
    pub query: Option<String>,
    pub top_k: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentsBody {
    #[serde(default)]
    pub file_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct TitleBody {
    pub message: Option<String>,
}

/// Standard HTTP error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            error: msg.into(),
            status: "error".to_string(),
        }
    }

    fn body(msg: impl Into<String>) -> serde_json::Value {
        serde_json::json!(Self::new(msg))
    }
}

// ============================================================================
// Inner (directly testable) functions
// ============================================================================

async fn dispatch(services: &RagServices, request: ChatragRequest) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(request, services).await;
    match response_to_http(response) {
        Ok(data) => (StatusCode::OK, data),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::body(e)),
    }
}

pub async fn health_inner(services: &RagServices) -> (StatusCode, serde_json::Value) {
    let response = crate::router::handle_request(ChatragRequest::Health, services).await;
    match response_to_http(response) {
        Ok(mut data) => {
            if let Some(obj) = data.as_object_mut() {
                obj.insert("version".to_string(), serde_json::json!(env!("CARGO_PKG_VERSION")));
                obj.insert(
                    "socket".to_string(),
                    serde_json::json!(services.config.service.socket_path),
                );
            }
            (StatusCode::OK, data)
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unhealthy",
                "error": e,
            }),
        ),
    }
}

/// Inner version: returns version info (pure, no IO).
pub fn version_inner() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "protocol": PROTOCOL_VERSION,
    })
}

pub async fn turn_inner(services: &RagServices, chat_id: String, body: TurnBody) -> (StatusCode, serde_json::Value) {
    match body.messages.last() {
        None => return (StatusCode::BAD_REQUEST, ErrorResponse::body("messages must not be empty")),
        Some(m) if m.content.trim().is_empty() => {
            return (StatusCode::BAD_REQUEST, ErrorResponse::body("Last message content is required"))
        }
        Some(_) => {}
    }

    let start = Instant::now();
    let (status, mut data) = dispatch(
        services,
        ChatragRequest::Turn {
            chat_id,
            messages: body.messages,
        },
    )
    .await;

    if let Some(obj) = data.as_object_mut() {
        obj.insert("took_ms".to_string(), serde_json::json!(start.elapsed().as_millis() as u64));
    }
    (status, data)
}

pub async fn ingest_inner(services: &RagServices, chat_id: String, body: IngestBody) -> (StatusCode, serde_json::Value) {
    let text = match body.text {
        Some(t) => t,
        None => return (StatusCode::BAD_REQUEST, ErrorResponse::body("text field is required")),
    };

    dispatch(
        services,
        ChatragRequest::Ingest {
            chat_id,
            text,
            metadata: body.metadata,
        },
    )
    .await
}

pub async fn retrieve_inner(
    services: &RagServices,
    chat_id: String,
    body: RetrieveBody,
) -> (StatusCode, serde_json::Value) {
    let query = match body.query {
        Some(q) if !q.trim().is_empty() => q,
        _ => return (StatusCode::BAD_REQUEST, ErrorResponse::body("query field is required")),
    };

    dispatch(
        services,
        ChatragRequest::Retrieve {
            chat_id,
            query,
            top_k: body.top_k,
        },
    )
    .await
}

pub async fn attachments_inner(
    services: &RagServices,
    chat_id: String,
    body: AttachmentsBody,
) -> (StatusCode, serde_json::Value) {
    let (status, data) = dispatch(
        services,
        ChatragRequest::Attach {
            chat_id,
            file_keys: body.file_keys,
        },
    )
    .await;

    // Work continues in the background
    if status == StatusCode::OK {
        (StatusCode::ACCEPTED, data)
    } else {
        (status, data)
    }
}

/// Conversation deletion hook: purge never fails the caller.
pub async fn purge_inner(services: &RagServices, chat_id: String) -> (StatusCode, serde_json::Value) {
    dispatch(
        services,
        ChatragRequest::Purge {
            chat_id,
            best_effort: true,
        },
    )
    .await
}

pub async fn title_inner(services: &RagServices, body: TitleBody) -> (StatusCode, serde_json::Value) {
    match body.message {
        Some(message) if !message.trim().is_empty() => {
            dispatch(services, ChatragRequest::Title { message }).await
        }
        _ => (StatusCode::BAD_REQUEST, ErrorResponse::body("Message is required")),
    }
}

// ============================================================================
// Axum handler wrappers (thin: delegate to inner functions)
// ============================================================================

pub async fn health_handler(State(services): State<Arc<RagServices>>) -> impl IntoResponse {
    let (status, body) = health_inner(&services).await;
    (status, Json(body))
}

pub async fn version_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(version_inner()))
}

pub async fn turn_handler(
    State(services): State<Arc<RagServices>>,
    Path(chat_id): Path<String>,
    Json(body): Json<TurnBody>,
) -> impl IntoResponse {
    let (status, body) = turn_inner(&services, chat_id, body).await;
    (status, Json(body))
}

pub async fn ingest_handler(
    State(services): State<Arc<RagServices>>,
    Path(chat_id): Path<String>,
    Json(body): Json<IngestBody>,
) -> impl IntoResponse {
    let (status, body) = ingest_inner(&services, chat_id, body).await;
    (status, Json(body))
}

pub async fn retrieve_handler(
    State(services): State<Arc<RagServices>>,
    Path(chat_id): Path<String>,
    Json(body): Json<RetrieveBody>,
) -> impl IntoResponse {
    let (status, body) = retrieve_inner(&services, chat_id, body).await;
    (status, Json(body))
}

pub async fn attachments_handler(
    State(services): State<Arc<RagServices>>,
    Path(chat_id): Path<String>,
    Json(body): Json<AttachmentsBody>,
) -> impl IntoResponse {
    let (status, body) = attachments_inner(&services, chat_id, body).await;
    (status, Json(body))
}

pub async fn purge_handler(
    State(services): State<Arc<RagServices>>,
    Path(chat_id): Path<String>,
) -> impl IntoResponse {
    let (status, body) = purge_inner(&services, chat_id).await;
    (status, Json(body))
}

pub async fn title_handler(
    State(services): State<Arc<RagServices>>,
    Json(body): Json<TitleBody>,
) -> impl IntoResponse {
    let (status, body) = title_inner(&services, body).await;
    (status, Json(body))
}

// ============================================================================
// Helpers
// ============================================================================

/// Convert an IPC `ChatragResponse` into an HTTP body value, or an error string.
pub fn response_to_http(response: ChatragResponse) -> std::result::Result<serde_json::Value, String> {
    if response.is_ok() {
        Ok(response.data.unwrap_or(serde_json::json!({})))
    } else {
        Err(response.error.unwrap_or_else(|| "unknown error".to_string()))
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================================================
    // TEST 1: version_inner is pure and returns correct fields
    // ========================================================================
    #[test]
    fn test_version_inner_pure() {
        let v = version_inner();
        assert!(v["version"].is_string(), "version must be string");
        assert_eq!(v["protocol"], "chatrag/1");
    }

    // ========================================================================
    // TEST 2: response_to_http: ok response extracts data
    // ========================================================================
    #[test]
    fn test_response_to_http_ok() {
        let resp = ChatragResponse::ok(serde_json::json!({"context": "", "count": 0}));
        let data = response_to_http(resp).unwrap();
        assert_eq!(data["count"], 0);
    }

    // ========================================================================
    // TEST 3: response_to_http: error response returns Err
    // ========================================================================
    #[test]
    fn test_response_to_http_error() {
        let resp = ChatragResponse::err("something went wrong");
        assert_eq!(response_to_http(resp).unwrap_err(), "something went wrong");
    }

    // ========================================================================
    // TEST 4: response_to_http: ok with no data returns empty object
    // ========================================================================
    #[test]
    fn test_response_to_http_ok_no_data() {
        let mut resp = ChatragResponse::ok(serde_json::json!({}));
        resp.data = None;
        assert!(response_to_http(resp).unwrap().is_object());
    }

    // ========================================================================
    // TEST 5: response_to_http: error with no message returns fallback
    // ========================================================================
    #[test]
    fn test_response_to_http_error_no_message() {
        let mut resp = ChatragResponse::err("x");
        resp.error = None;
        assert_eq!(response_to_http(resp).unwrap_err(), "unknown error");
    }

    // ========================================================================
    // TEST 6: ErrorResponse body shape
    // ========================================================================
    #[test]
    fn test_error_body_shape() {
        let body = ErrorResponse::body("query field is required");
        assert_eq!(body["status"], "error");
        assert_eq!(body["error"], "query field is required");
    }
}
