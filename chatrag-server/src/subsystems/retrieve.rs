//! Retrieval subsystem: conversation-scoped semantic search
//!
//! This subsystem implements `ChatragRequest::Retrieve`:
//! - Embeds the query with the query task type
//! - Searches the index filtered to `chatId == chat_id`
//! - Joins the matched chunk texts (best first) with a blank line

use std::sync::Arc;

use chatrag_core::embeddings::{EmbeddingBackend, EmbeddingError};
use chatrag_core::index::{IndexError, Metadata, QueryMatch, QueryRequest, VectorIndex};
use thiserror::Error;

/// Separator between retrieved chunks in the context string.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index query failed: {0}")]
    Index(#[from] IndexError),
}

pub struct RetrievalPipeline {
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn VectorIndex>,
    default_top_k: usize,
}

impl RetrievalPipeline {
    pub fn new(embedder: Arc<dyn EmbeddingBackend>, index: Arc<dyn VectorIndex>, default_top_k: usize) -> Self {
        Self {
            embedder,
            index,
            default_top_k,
        }
    }

    pub fn default_top_k(&self) -> usize {
        self.default_top_k
    }

    /// Matches for `query` within one conversation that carry chunk text,
    /// in descending score order.
    pub async fn search(
        &self,
        chat_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<QueryMatch>, RetrievalError> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        let vector = self.embedder.embed_query(query).await?;

        let mut filter = Metadata::new();
        filter.insert("chatId".to_string(), chat_id.into());

        let matches = self
            .index
            .query(QueryRequest {
                vector,
                top_k,
                filter,
                include_metadata: true,
            })
            .await?;

        let found = matches.len();
        let kept: Vec<QueryMatch> = matches
            .into_iter()
            .filter(|m| m.text().is_some_and(|t| !t.is_empty()))
            .collect();

        tracing::debug!(
            chat_id = %chat_id,
            top_k = top_k,
            found = found,
            kept = kept.len(),
            "Retrieved context"
        );

        Ok(kept)
    }

    /// Context string for `query`: matched texts joined by a blank line, or
    /// empty when nothing matched.
    pub async fn retrieve(
        &self,
        chat_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<String, RetrievalError> {
        let matches = self.search(chat_id, query, top_k).await?;
        Ok(join_context(&matches))
    }
}

pub fn join_context(matches: &[QueryMatch]) -> String {
    matches
        .iter()
        .filter_map(QueryMatch::text)
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}
