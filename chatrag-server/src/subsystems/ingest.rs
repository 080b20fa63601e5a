//! Ingestion subsystem: chunk, embed and store text for one conversation
//!
//! This subsystem implements `ChatragRequest::Ingest`:
//! - Splits text with the configured `Chunker`
//! - Embeds every chunk concurrently (one failure fails the call)
//! - Writes one record per chunk in a single `upsert`
//!
//! Every record gets a fresh UUID v4 id and carries `chatId`, `text`, `type`
//! and `timestamp` in its metadata.

use std::sync::Arc;

use chatrag_core::embeddings::{EmbeddingBackend, EmbeddingError};
use chatrag_core::index::{IndexError, IndexedRecord, Metadata, MetadataValue, VectorIndex};
use chatrag_core::models::MessageRole;
use chatrag_core::Chunker;
use chrono::SecondsFormat;
use futures::future::try_join_all;
use thiserror::Error;
use uuid::Uuid;

/// `type` tag for conversational messages.
pub const MESSAGE_TYPE: &str = "message";

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Index write failed: {0}")]
    Index(#[from] IndexError),
}

pub struct IngestionPipeline {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn VectorIndex>,
}

impl IngestionPipeline {
    pub fn new(chunker: Chunker, embedder: Arc<dyn EmbeddingBackend>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            chunker,
            embedder,
            index,
        }
    }

    /// Store `text` for `chat_id`. Returns the number of records written;
    /// blank text writes nothing and returns 0.
    ///
    /// Caller metadata cannot override `chatId`, `text` or `timestamp`.
    /// `type` defaults to `"message"`.
    pub async fn ingest(&self, chat_id: &str, text: &str, metadata: Metadata) -> Result<usize, IngestError> {
        if text.trim().is_empty() {
            tracing::debug!(chat_id = %chat_id, "Skipping ingest of blank text");
            return Ok(0);
        }

        // Whitespace runs (blank PDF pages) can yield blank chunks; the
        // embedding backends reject those
        let chunks: Vec<String> = self
            .chunker
            .chunk(text)
            .into_iter()
            .filter(|chunk| !chunk.trim().is_empty())
            .collect();

        let vectors = try_join_all(chunks.iter().map(|chunk| self.embedder.embed(chunk))).await?;

        let timestamp = chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let mut base = metadata;
        base.entry("type".to_string())
            .or_insert_with(|| MetadataValue::from(MESSAGE_TYPE));
        base.insert("chatId".to_string(), chat_id.into());
        base.insert("timestamp".to_string(), timestamp.into());

        let records: Vec<IndexedRecord> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, values)| {
                let mut metadata = base.clone();
                metadata.insert("text".to_string(), chunk.into());
                IndexedRecord {
                    id: Uuid::new_v4().to_string(),
                    values,
                    metadata,
                }
            })
            .collect();

        let count = records.len();
        self.index.upsert(records).await?;

        tracing::info!(
            chat_id = %chat_id,
            chunks = count,
            index = self.index.name(),
            "Ingested text"
        );

        Ok(count)
    }

    /// Store one chat message tagged with its author.
    pub async fn store_message(
        &self,
        chat_id: &str,
        content: &str,
        role: MessageRole,
    ) -> Result<usize, IngestError> {
        let mut metadata = Metadata::new();
        metadata.insert("type".to_string(), MESSAGE_TYPE.into());
        metadata.insert("role".to_string(), role.as_str().into());
        self.ingest(chat_id, content, metadata).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chatrag_core::index::InMemoryIndex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct LengthEmbedder {
        calls: AtomicUsize,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl EmbeddingBackend for LengthEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if text.trim().is_empty() {
                return Err(EmbeddingError::EmptyInput);
            }
            if self.fail_on.is_some_and(|f| text.contains(f)) {
                return Err(EmbeddingError::Api {
                    code: 503,
                    message: "unavailable".to_string(),
                });
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "length"
        }
    }

    fn pipeline(fail_on: Option<&'static str>) -> (IngestionPipeline, Arc<LengthEmbedder>, Arc<InMemoryIndex>) {
        let embedder = Arc::new(LengthEmbedder {
            calls: AtomicUsize::new(0),
            fail_on,
        });
        let index = Arc::new(InMemoryIndex::new(2));
        let chunker = Chunker::new(20, 5).unwrap();
        (
            IngestionPipeline::new(chunker, embedder.clone(), index.clone()),
            embedder,
            index,
        )
    }

    async fn all_records(index: &InMemoryIndex, chat_id: &str) -> Vec<IndexedRecord> {
        let mut filter = Metadata::new();
        filter.insert("chatId".into(), chat_id.into());
        let matches = index
            .query(chatrag_core::index::QueryRequest {
                vector: vec![0.0, 0.0],
                top_k: 1000,
                filter,
                include_metadata: false,
            })
            .await
            .unwrap();
        let mut records = Vec::new();
        for m in matches {
            records.push(index.get(&m.id).await.unwrap());
        }
        records
    }

    #[tokio::test]
    async fn test_blank_text_is_a_noop() {
        let (pipeline, embedder, index) = pipeline(None);

        assert_eq!(pipeline.ingest("c1", "", Metadata::new()).await.unwrap(), 0);
        assert_eq!(pipeline.ingest("c1", "  \n\t", Metadata::new()).await.unwrap(), 0);

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_one_record_per_chunk_with_required_metadata() {
        let (pipeline, embedder, index) = pipeline(None);
        let text = "The first sentence is here. The second one follows it.";

        let written = pipeline.ingest("c1", text, Metadata::new()).await.unwrap();

        assert!(written > 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), written);

        let records = all_records(&index, "c1").await;
        assert_eq!(records.len(), written);
        for record in &records {
            assert!(Uuid::parse_str(&record.id).is_ok());
            assert_eq!(record.metadata["chatId"], MetadataValue::from("c1"));
            assert_eq!(record.metadata["type"], MetadataValue::from("message"));
            let chunk = record.metadata["text"].as_str().unwrap();
            assert!(text.contains(chunk));
            let ts = record.metadata["timestamp"].as_str().unwrap();
            assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
        }
    }

    #[tokio::test]
    async fn test_caller_cannot_override_required_fields() {
        let (pipeline, _, index) = pipeline(None);
        let mut metadata = Metadata::new();
        metadata.insert("chatId".into(), "other".into());
        metadata.insert("text".into(), "forged".into());
        metadata.insert("timestamp".into(), "yesterday".into());
        metadata.insert("type".into(), "pdf".into());
        metadata.insert("fileName".into(), "a.pdf".into());

        pipeline.ingest("c1", "short note", metadata).await.unwrap();

        let records = all_records(&index, "c1").await;
        assert_eq!(records.len(), 1);
        let m = &records[0].metadata;
        assert_eq!(m["chatId"], MetadataValue::from("c1"));
        assert_eq!(m["text"], MetadataValue::from("short note"));
        assert_ne!(m["timestamp"], MetadataValue::from("yesterday"));
        assert_eq!(m["type"], MetadataValue::from("pdf"));
        assert_eq!(m["fileName"], MetadataValue::from("a.pdf"));
        assert!(all_records(&index, "other").await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_text_gets_distinct_ids() {
        let (pipeline, _, index) = pipeline(None);

        pipeline.ingest("c1", "same words", Metadata::new()).await.unwrap();
        pipeline.ingest("c1", "same words", Metadata::new()).await.unwrap();

        assert_eq!(index.len().await, 2);
    }

    #[tokio::test]
    async fn test_one_failed_chunk_fails_the_call_and_writes_nothing() {
        let (pipeline, _, index) = pipeline(Some("poison"));
        let text = "A perfectly fine opening. Then a poison chunk appears.";

        let result = pipeline.ingest("c1", text, Metadata::new()).await;

        assert!(matches!(result, Err(IngestError::Embedding(_))));
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_whitespace_runs_are_not_embedded() {
        let (pipeline, embedder, index) = pipeline(None);
        let text = format!("a{}b", "\n".repeat(3000));

        let written = pipeline.ingest("c1", &text, Metadata::new()).await.unwrap();

        assert_eq!(written, 2);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 2);
        let mut texts: Vec<String> = all_records(&index, "c1")
            .await
            .iter()
            .map(|r| r.metadata["text"].as_str().unwrap().trim().to_string())
            .collect();
        texts.sort();
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_store_message_tags_role() {
        let (pipeline, _, index) = pipeline(None);

        pipeline
            .store_message("c1", "thanks!", MessageRole::Agent)
            .await
            .unwrap();

        let records = all_records(&index, "c1").await;
        assert_eq!(records[0].metadata["role"], MetadataValue::from("agent"));
        assert_eq!(records[0].metadata["type"], MetadataValue::from("message"));
    }
}
