//! Conversation purge: delete every vector of one conversation
//!
//! The index contract has no delete-by-filter, so ids are enumerated with a
//! zero-vector query bounded by `purge_ceiling` and then deleted in one call.
//! A conversation with more records than the ceiling keeps the excess.

use std::sync::Arc;

use chatrag_core::index::{IndexError, Metadata, QueryRequest, VectorIndex};

pub struct ConversationPurge {
    index: Arc<dyn VectorIndex>,
    ceiling: usize,
}

impl ConversationPurge {
    pub fn new(index: Arc<dyn VectorIndex>, ceiling: usize) -> Self {
        Self { index, ceiling }
    }

    /// Returns the number of ids deleted.
    pub async fn purge(&self, chat_id: &str) -> Result<usize, IndexError> {
        let mut filter = Metadata::new();
        filter.insert("chatId".to_string(), chat_id.into());

        let matches = self
            .index
            .query(QueryRequest {
                vector: vec![0.0; self.index.dimensions()],
                top_k: self.ceiling,
                filter,
                include_metadata: false,
            })
            .await?;

        if matches.is_empty() {
            tracing::debug!(chat_id = %chat_id, "No vectors to purge");
            return Ok(0);
        }

        if matches.len() >= self.ceiling {
            tracing::warn!(
                chat_id = %chat_id,
                ceiling = self.ceiling,
                "Purge hit the enumeration ceiling; some vectors may remain"
            );
        }

        let ids: Vec<String> = matches.into_iter().map(|m| m.id).collect();
        self.index.delete_many(&ids).await?;

        tracing::info!(chat_id = %chat_id, deleted = ids.len(), "Purged conversation vectors");
        Ok(ids.len())
    }

    /// Purge as part of conversation deletion: failures are logged, never returned.
    pub async fn purge_on_delete(&self, chat_id: &str) -> usize {
        match self.purge(chat_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(chat_id = %chat_id, error = %e, "Failed to purge conversation vectors");
                0
            }
        }
    }
}
