use chatrag_core::ipc::{ChatragRequest, ChatragResponse};

use crate::services::RagServices;
use crate::subsystems::attachments::spawn_attachment_ingest;
use crate::subsystems::retrieve::join_context;

/// Dispatch one request. Shared by the IPC server and the HTTP handlers.
pub async fn handle_request(request: ChatragRequest, services: &RagServices) -> ChatragResponse {
    let action = request.action();
    tracing::debug!(action = action, "Handling request");

    match request {
        ChatragRequest::Ping => ChatragResponse::pong(),
        ChatragRequest::Health => handle_health(services).await,
        ChatragRequest::Ingest {
            chat_id,
            text,
            metadata,
        } => {
            if chat_id.trim().is_empty() {
                return ChatragResponse::err("chat_id is required");
            }
            match services.ingestion.ingest(&chat_id, &text, metadata).await {
                Ok(chunks) => ChatragResponse::ok(serde_json::json!({
                    "chat_id": chat_id,
                    "chunks": chunks,
                })),
                Err(e) => ChatragResponse::err(e.to_string()),
            }
        }
        ChatragRequest::Retrieve {
            chat_id,
            query,
            top_k,
        } => {
            if query.trim().is_empty() {
                return ChatragResponse::err("Query cannot be empty");
            }
            match services.retrieval.search(&chat_id, &query, top_k).await {
                Ok(matches) => {
                    let results: Vec<serde_json::Value> = matches
                        .iter()
                        .map(|m| {
                            serde_json::json!({
                                "id": m.id,
                                "score": m.score,
                                "text": m.text().unwrap_or_default(),
                            })
                        })
                        .collect();
                    ChatragResponse::ok(serde_json::json!({
                        "context": join_context(&matches),
                        "count": results.len(),
                        "results": results,
                    }))
                }
                Err(e) => ChatragResponse::err(e.to_string()),
            }
        }
        ChatragRequest::Turn { chat_id, messages } => {
            match services.turns.respond(&chat_id, &messages).await {
                Ok(reply) => match serde_json::to_value(&reply) {
                    Ok(data) => ChatragResponse::ok(data),
                    Err(e) => ChatragResponse::err(e.to_string()),
                },
                Err(e) => ChatragResponse::err(e.to_string()),
            }
        }
        ChatragRequest::Attach { chat_id, file_keys } => {
            if file_keys.is_empty() {
                return ChatragResponse::ok(serde_json::json!({ "queued": 0 }));
            }
            let queued = file_keys.len();
            spawn_attachment_ingest(services.attachments.clone(), chat_id.clone(), file_keys);
            ChatragResponse::ok(serde_json::json!({
                "chat_id": chat_id,
                "queued": queued,
            }))
        }
        ChatragRequest::Purge {
            chat_id,
            best_effort,
        } => {
            if best_effort {
                let deleted = services.purge.purge_on_delete(&chat_id).await;
                return ChatragResponse::ok(serde_json::json!({ "deleted": deleted }));
            }
            match services.purge.purge(&chat_id).await {
                Ok(deleted) => ChatragResponse::ok(serde_json::json!({ "deleted": deleted })),
                Err(e) => ChatragResponse::err(e.to_string()),
            }
        }
        ChatragRequest::Title { message } => {
            if message.trim().is_empty() {
                return ChatragResponse::err("Message is required");
            }
            let title = services.titles.generate_title(&message).await;
            ChatragResponse::ok(serde_json::json!({ "name": title }))
        }
    }
}

async fn handle_health(services: &RagServices) -> ChatragResponse {
    let mut data = serde_json::json!({
        "status": "healthy",
        "index": services.index.name(),
        "dimensions": services.index.dimensions(),
    });

    if let Some(pool) = &services.pool {
        match chatrag_core::db::check_health(pool).await {
            Ok(db) => data["database"] = serde_json::json!(db),
            Err(e) => return ChatragResponse::err(format!("DB Health Check failed: {}", e)),
        }
    }

    ChatragResponse::ok(data)
}
