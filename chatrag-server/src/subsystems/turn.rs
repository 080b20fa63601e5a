//! Turn orchestrator: one user message in, one reply out
//!
//! Call order is part of the contract:
//! 1. hand the latest message's attachments to the document path (detached)
//! 2. retrieve context for the question
//! 3. assemble the prompt
//! 4. call chat completion
//! 5. ingest the user message, then the reply
//!
//! Retrieval runs before the user message is ingested so a turn never
//! matches its own question. Retrieval and ingestion failures degrade to
//! "no context" / "not stored"; a completion failure yields `FALLBACK_REPLY`.

use std::sync::Arc;

use chatrag_core::completion::ChatCompletion;
use chatrag_core::models::{ChatMessage, MessageRole};
use serde::Serialize;
use thiserror::Error;

use super::attachments::{spawn_attachment_ingest, AttachmentIngestor};
use super::context::assemble;
use super::ingest::IngestionPipeline;
use super::retrieve::RetrievalPipeline;

/// Reply shown to the user when the model could not answer.
pub const FALLBACK_REPLY: &str = "Sorry, I am unable to respond at the moment.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TurnError {
    #[error("At least one message is required")]
    EmptyHistory,

    #[error("Last message content is required")]
    EmptyMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnReply {
    pub reply: String,
    /// Whether retrieved context went into the prompt.
    pub context_used: bool,
    /// Whether `reply` is the fallback text.
    pub fallback: bool,
}

pub struct TurnOrchestrator {
    ingestion: Arc<IngestionPipeline>,
    retrieval: Arc<RetrievalPipeline>,
    attachments: Arc<AttachmentIngestor>,
    completion: Arc<dyn ChatCompletion>,
}

impl TurnOrchestrator {
    pub fn new(
        ingestion: Arc<IngestionPipeline>,
        retrieval: Arc<RetrievalPipeline>,
        attachments: Arc<AttachmentIngestor>,
        completion: Arc<dyn ChatCompletion>,
    ) -> Self {
        Self {
            ingestion,
            retrieval,
            attachments,
            completion,
        }
    }

    /// Answer the last message of `messages` (oldest first).
    pub async fn respond(&self, chat_id: &str, messages: &[ChatMessage]) -> Result<TurnReply, TurnError> {
        let (latest, prior) = messages.split_last().ok_or(TurnError::EmptyHistory)?;
        if latest.content.trim().is_empty() {
            return Err(TurnError::EmptyMessage);
        }

        let pdfs: Vec<String> = latest.pdf_attachments().cloned().collect();
        if !pdfs.is_empty() {
            tracing::info!(chat_id = %chat_id, count = pdfs.len(), "Queueing attachments for ingestion");
            spawn_attachment_ingest(self.attachments.clone(), chat_id.to_string(), pdfs);
        }

        let context = match self.retrieval.retrieve(chat_id, &latest.content, None).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Failed to retrieve context, proceeding without it");
                String::new()
            }
        };
        let context_used = !context.trim().is_empty();

        let assembled = assemble(latest, prior, &context);

        let (reply, fallback) = match self.completion.complete(&assembled.history, &assembled.prompt).await {
            Ok(text) => (text, false),
            Err(e) => {
                tracing::warn!(chat_id = %chat_id, error = %e, "Chat completion failed, sending fallback reply");
                (FALLBACK_REPLY.to_string(), true)
            }
        };

        if let Err(e) = self
            .ingestion
            .store_message(chat_id, &latest.content, MessageRole::User)
            .await
        {
            tracing::warn!(chat_id = %chat_id, error = %e, "Failed to store user message");
        }
        if !fallback {
            if let Err(e) = self
                .ingestion
                .store_message(chat_id, &reply, MessageRole::Agent)
                .await
            {
                tracing::warn!(chat_id = %chat_id, error = %e, "Failed to store reply");
            }
        }

        Ok(TurnReply {
            reply,
            context_used,
            fallback,
        })
    }
}
