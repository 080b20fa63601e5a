//! Service wiring: every pipeline and client, built once at startup
//!
//! `RagServices` owns the shared handles. `main` builds it from config; tests
//! build it from fakes with `RagServices::with_collaborators`.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chatrag_core::completion::{ChatCompletion, GeminiChatClient, GeminiChatConfig};
use chatrag_core::config::IndexBackend;
use chatrag_core::embeddings::{
    EmbeddingBackend, GeminiEmbeddingClient, GeminiEmbeddingConfig, RetryingEmbedder,
};
use chatrag_core::extraction::{DocumentExtractor, PdfServiceClient};
use chatrag_core::index::pinecone::PineconeConfig;
use chatrag_core::index::{InMemoryIndex, PgVectorIndex, PineconeIndex, VectorIndex};
use chatrag_core::{ChatragConfig, Chunker, ChunkingError, TitleGenerator};
use sqlx::PgPool;

use crate::subsystems::attachments::AttachmentIngestor;
use crate::subsystems::ingest::IngestionPipeline;
use crate::subsystems::purge::ConversationPurge;
use crate::subsystems::retrieve::RetrievalPipeline;
use crate::subsystems::turn::TurnOrchestrator;

/// External collaborators the pipelines are built on.
pub struct Collaborators {
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub index: Arc<dyn VectorIndex>,
    pub extractor: Arc<dyn DocumentExtractor>,
    pub completion: Arc<dyn ChatCompletion>,
    pub titles: Arc<TitleGenerator>,
}

pub struct RagServices {
    pub config: ChatragConfig,
    pub pool: Option<PgPool>,
    pub index: Arc<dyn VectorIndex>,
    pub ingestion: Arc<IngestionPipeline>,
    pub retrieval: Arc<RetrievalPipeline>,
    pub attachments: Arc<AttachmentIngestor>,
    pub purge: Arc<ConversationPurge>,
    pub turns: Arc<TurnOrchestrator>,
    pub titles: Arc<TitleGenerator>,
}

impl RagServices {
    /// Build the Gemini clients, the extraction client and the configured index.
    pub async fn from_config(config: ChatragConfig) -> Result<Self> {
        let dimensions = config.embedding.dimensions as usize;

        let mut embedding_config =
            GeminiEmbeddingConfig::new(None, config.embedding.model.clone(), dimensions);
        embedding_config.max_input_tokens = config.embedding.max_input_tokens as usize;
        let gemini: Arc<dyn EmbeddingBackend> = Arc::new(
            GeminiEmbeddingClient::new(embedding_config).context("Failed to create embedding client")?,
        );
        let embedder: Arc<dyn EmbeddingBackend> = if config.embedding.max_retries > 0 {
            Arc::new(RetryingEmbedder::new(
                gemini,
                config.embedding.max_retries as usize,
                config.embedding.retry_delay_ms,
            ))
        } else {
            gemini
        };

        let pool = match &config.database {
            Some(db) => Some(
                chatrag_core::db::create_pool(db)
                    .await
                    .context("Failed to connect to database")?,
            ),
            None => None,
        };

        let index: Arc<dyn VectorIndex> = match config.index.backend {
            IndexBackend::Memory => {
                tracing::warn!("Using in-memory vector index; stored context is lost on restart");
                Arc::new(InMemoryIndex::new(dimensions))
            }
            IndexBackend::Pinecone => {
                let host = config
                    .index
                    .pinecone_host
                    .clone()
                    .ok_or_else(|| anyhow!("index.pinecone_host is required for the pinecone backend"))?;
                Arc::new(PineconeIndex::new(PineconeConfig::new(host, None, dimensions))?)
            }
            IndexBackend::Pgvector => {
                let pool = pool
                    .clone()
                    .ok_or_else(|| anyhow!("[database] is required for the pgvector backend"))?;
                let index = PgVectorIndex::new(pool, &config.index.table, dimensions)?;
                index.ensure_schema().await?;
                Arc::new(index)
            }
        };

        let extractor: Arc<dyn DocumentExtractor> = Arc::new(PdfServiceClient::new(&config.extraction)?);
        let completion: Arc<dyn ChatCompletion> = Arc::new(
            GeminiChatClient::new(GeminiChatConfig::from_config(&config.completion, None))
                .context("Failed to create chat completion client")?,
        );
        let titles = Arc::new(TitleGenerator::gemini(&config.completion, None)?);

        tracing::info!(
            embedder = embedder.name(),
            index = index.name(),
            dimensions = dimensions,
            "RAG services initialised"
        );

        let mut services = Self::with_collaborators(
            config,
            Collaborators {
                embedder,
                index,
                extractor,
                completion,
                titles,
            },
        )?;
        services.pool = pool;
        Ok(services)
    }

    /// Wire the pipelines over the given collaborators.
    pub fn with_collaborators(config: ChatragConfig, collaborators: Collaborators) -> Result<Self, ChunkingError> {
        let Collaborators {
            embedder,
            index,
            extractor,
            completion,
            titles,
        } = collaborators;

        let chunker = Chunker::from_config(&config.chunking)?;
        let ingestion = Arc::new(IngestionPipeline::new(chunker, embedder.clone(), index.clone()));
        let retrieval = Arc::new(RetrievalPipeline::new(
            embedder,
            index.clone(),
            config.retrieval.top_k,
        ));
        let attachments = Arc::new(AttachmentIngestor::new(extractor, ingestion.clone()));
        let purge = Arc::new(ConversationPurge::new(index.clone(), config.retrieval.purge_ceiling));
        let turns = Arc::new(TurnOrchestrator::new(
            ingestion.clone(),
            retrieval.clone(),
            attachments.clone(),
            completion,
        ));

        Ok(Self {
            config,
            pool: None,
            index,
            ingestion,
            retrieval,
            attachments,
            purge,
            turns,
            titles,
        })
    }
}
