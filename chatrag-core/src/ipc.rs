//! IPC envelope shared by the Unix-socket server, the HTTP layer and clients.
//!
//! Frames are a 4-byte little-endian length prefix followed by a MessagePack
//! map (`rmp_serde::to_vec_named`).

use serde::{Deserialize, Serialize};

use crate::error::ChatragError;
use crate::index::Metadata;
use crate::models::ChatMessage;

pub const PROTOCOL_VERSION: &str = "chatrag/1";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChatragRequest {
    Ping,
    Health,
    /// Chunk, embed and store text for a conversation.
    Ingest {
        chat_id: String,
        text: String,
        #[serde(default)]
        metadata: Metadata,
    },
    Retrieve {
        chat_id: String,
        query: String,
        top_k: Option<usize>,
    },
    /// Run a full chat turn over the given history (latest message last).
    Turn {
        chat_id: String,
        messages: Vec<ChatMessage>,
    },
    /// Queue attachments for out-of-band extraction and ingestion.
    Attach {
        chat_id: String,
        file_keys: Vec<String>,
    },
    /// Delete all vectors of a conversation. With `best_effort` a failure
    /// is logged and reported as zero deletions instead of an error.
    Purge {
        chat_id: String,
        #[serde(default)]
        best_effort: bool,
    },
    Title {
        message: String,
    },
}

impl ChatragRequest {
    pub fn action(&self) -> &'static str {
        match self {
            ChatragRequest::Ping => "ping",
            ChatragRequest::Health => "health",
            ChatragRequest::Ingest { .. } => "ingest",
            ChatragRequest::Retrieve { .. } => "retrieve",
            ChatragRequest::Turn { .. } => "turn",
            ChatragRequest::Attach { .. } => "attach",
            ChatragRequest::Purge { .. } => "purge",
            ChatragRequest::Title { .. } => "title",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatragResponse {
    pub status: String,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub version: String,
}

impl ChatragResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            status: "ok".to_string(),
            data: Some(data),
            error: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            data: None,
            error: Some(msg.into()),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(serde_json::json!({"pong": true}))
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, ChatragError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

pub fn decode<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T, ChatragError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
