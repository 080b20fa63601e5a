pub mod chunker;
pub mod completion;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod extraction;
pub mod index;
pub mod ipc;
pub mod models;
pub mod title;

pub use chunker::{Chunker, ChunkingError};
pub use completion::{ChatCompletion, CompletionError, GeminiChatClient, HistoryTurn, Role};
pub use config::ChatragConfig;
pub use embeddings::{
    EmbeddingBackend, EmbeddingError, GeminiEmbeddingClient, RetryingEmbedder, GEMINI_DIMENSIONS,
};
pub use error::ChatragError;
pub use extraction::{DocumentExtractor, ExtractedDocument, ExtractionError, PdfServiceClient};
pub use index::{IndexError, IndexedRecord, Metadata, MetadataValue, QueryMatch, QueryRequest, VectorIndex};
pub use models::{ChatMessage, MessageRole};
pub use title::{simple_title, TitleGenerator};
