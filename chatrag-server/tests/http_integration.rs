//! HTTP integration tests for the chatrag REST API
//!
//! Everything runs against the in-memory index and deterministic fakes from
//! `common`, so no network or database is needed. Tests either call the
//! inner functions directly or dispatch through the Axum router with `oneshot`.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chatrag_server::http::{build_router, ingest_inner, retrieve_inner, IngestBody, RetrieveBody};
use chatrag_server::subsystems::turn::FALLBACK_REPLY;
use common::{harness, wait_for_records, ScriptedCompletion};
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(app: axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let req = match body {
        Some(b) => builder
            .header("content-type", "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn user_message(id: i64, content: &str) -> Value {
    json!({
        "id": id,
        "content": content,
        "role": "user",
        "createdAt": "2024-05-01T12:00:00Z",
    })
}

// ===========================================================================
// TEST 1: GET /version: version and protocol
// ===========================================================================
#[tokio::test]
async fn test_version_endpoint() {
    let h = harness(ScriptedCompletion::replying("ok"));

    let (status, body) = send(build_router(h.services.clone()), "GET", "/version", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["protocol"], "chatrag/1");
    assert!(body["version"].is_string());
}

// ===========================================================================
// TEST 2: GET /health: reports the index backend
// ===========================================================================
#[tokio::test]
async fn test_health_endpoint() {
    let h = harness(ScriptedCompletion::replying("ok"));

    let (status, body) = send(build_router(h.services.clone()), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["index"], "counting");
    assert_eq!(body["dimensions"], 64);
    assert!(body.get("database").is_none());
}

// ===========================================================================
// TEST 3: ingest then retrieve through the inner functions
// ===========================================================================
#[tokio::test]
async fn test_ingest_then_retrieve_inner() {
    let h = harness(ScriptedCompletion::replying("ok"));

    let (status, body) = ingest_inner(
        &h.services,
        "chat-1".to_string(),
        IngestBody {
            text: Some("The staging database lives in eu-west".to_string()),
            metadata: Default::default(),
        },
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks"], 1);

    let (status, body) = retrieve_inner(
        &h.services,
        "chat-1".to_string(),
        RetrieveBody {
            query: Some("where is the staging database".to_string()),
            top_k: Some(3),
        },
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["context"], "The staging database lives in eu-west");
    assert_eq!(body["results"][0]["text"], "The staging database lives in eu-west");
}

// ===========================================================================
// TEST 4: POST /chats/:id/ingest + /retrieve via oneshot
// ===========================================================================
#[tokio::test]
async fn test_ingest_and_retrieve_routes() {
    let h = harness(ScriptedCompletion::replying("ok"));

    let (status, body) = send(
        build_router(h.services.clone()),
        "POST",
        "/chats/abc/ingest",
        Some(json!({ "text": "hello world", "metadata": { "source": "test" } })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["chat_id"], "abc");

    let (status, body) = send(
        build_router(h.services.clone()),
        "POST",
        "/chats/abc/retrieve",
        Some(json!({ "query": "hello", "top_k": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["context"].as_str().unwrap().contains("hello world"));

    let (_, other) = send(
        build_router(h.services.clone()),
        "POST",
        "/chats/other/retrieve",
        Some(json!({ "query": "hello" })),
    )
    .await;
    assert_eq!(other["context"], "");
    assert_eq!(other["count"], 0);
}

// ===========================================================================
// TEST 5: missing fields are 400s
// ===========================================================================
#[tokio::test]
async fn test_bad_requests() {
    let h = harness(ScriptedCompletion::replying("ok"));

    let cases = [
        ("/chats/abc/ingest", json!({})),
        ("/chats/abc/retrieve", json!({ "query": "   " })),
        ("/chats/abc/turn", json!({ "messages": [] })),
        ("/chats/abc/turn", json!({ "messages": [user_message(1, "")] })),
        ("/titles", json!({})),
    ];

    for (uri, body) in cases {
        let (status, resp) = send(build_router(h.services.clone()), "POST", uri, Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} should reject", uri);
        assert_eq!(resp["status"], "error");
        assert!(resp["error"].is_string());
    }
    assert!(h.completion.calls.lock().unwrap().is_empty());
}

// ===========================================================================
// TEST 6: POST /chats/:id/turn: reply, then context on the next turn
// ===========================================================================
#[tokio::test]
async fn test_turn_route() {
    let h = harness(ScriptedCompletion::replying("Noted, your flight is on Friday."));

    let (status, body) = send(
        build_router(h.services.clone()),
        "POST",
        "/chats/trip/turn",
        Some(json!({ "messages": [user_message(1, "My flight leaves on Friday")] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {}", body);
    assert_eq!(body["reply"], "Noted, your flight is on Friday.");
    assert_eq!(body["context_used"], false);
    assert_eq!(body["fallback"], false);
    assert!(body["took_ms"].is_u64());

    let (_, body) = send(
        build_router(h.services.clone()),
        "POST",
        "/chats/trip/turn",
        Some(json!({ "messages": [
            user_message(1, "My flight leaves on Friday"),
            { "id": 2, "content": "Noted, your flight is on Friday.", "role": "agent", "createdAt": "2024-05-01T12:00:01Z" },
            user_message(3, "When does my flight leave?"),
        ] })),
    )
    .await;
    assert_eq!(body["context_used"], true);
    assert!(h
        .completion
        .last_prompt()
        .unwrap()
        .contains("My flight leaves on Friday"));
}

// ===========================================================================
// TEST 7: a failing model still answers 200 with the fallback
// ===========================================================================
#[tokio::test]
async fn test_turn_route_fallback() {
    let h = harness(ScriptedCompletion::failing());

    let (status, body) = send(
        build_router(h.services.clone()),
        "POST",
        "/chats/x/turn",
        Some(json!({ "messages": [user_message(1, "Anyone there?")] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["reply"], FALLBACK_REPLY);
    assert_eq!(body["fallback"], true);
}

// ===========================================================================
// TEST 8: POST /chats/:id/attachments: accepted, processed in background
// ===========================================================================
#[tokio::test]
async fn test_attachments_route() {
    let h = harness(ScriptedCompletion::replying("ok"));

    let (status, body) = send(
        build_router(h.services.clone()),
        "POST",
        "/chats/docs/attachments",
        Some(json!({ "file_keys": ["uploads/spec-sheet.pdf", "uploads/bad.pdf"] })),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["queued"], 2);
    assert_eq!(wait_for_records(&h.index, "docs", 1).await, 1);
}

// ===========================================================================
// TEST 9: DELETE /chats/:id/vectors: removes only that chat
// ===========================================================================
#[tokio::test]
async fn test_purge_route() {
    let h = harness(ScriptedCompletion::replying("ok"));
    for chat in ["gone", "kept"] {
        let (status, _) = send(
            build_router(h.services.clone()),
            "POST",
            &format!("/chats/{}/ingest", chat),
            Some(json!({ "text": "shared words in both chats" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(build_router(h.services.clone()), "DELETE", "/chats/gone/vectors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    // Purging an empty conversation is not an error
    let (status, body) = send(build_router(h.services.clone()), "DELETE", "/chats/gone/vectors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);

    assert_eq!(wait_for_records(&h.index, "kept", 1).await, 1);
}

// ===========================================================================
// TEST 10: POST /titles: cleaned model output
// ===========================================================================
#[tokio::test]
async fn test_title_route() {
    let h = harness(ScriptedCompletion::replying("ok"));

    let (status, body) = send(
        build_router(h.services.clone()),
        "POST",
        "/titles",
        Some(json!({ "message": "Help me plan the product launch" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Launch Planning");
}
