use config::{Config, ConfigError, Environment, File};

use crate::error::ChatragError;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ChatragConfig {
    pub service: ServiceConfig,
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub index: IndexConfig,
    pub completion: CompletionConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: u32,
    /// Model input limit, in estimated tokens.
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: u32,
    /// Caller-side retries around the embedding client. 0 disables retrying.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_max_input_tokens() -> u32 {
    2048
}

fn default_retry_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

/// Largest `topK` a Pinecone query accepts.
pub const MAX_PURGE_CEILING: usize = 10_000;

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Upper bound on ids enumerated when purging a conversation, at most
    /// [`MAX_PURGE_CEILING`].
    pub purge_ceiling: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            purge_ceiling: MAX_PURGE_CEILING,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    #[default]
    Memory,
    Pinecone,
    Pgvector,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default)]
    pub backend: IndexBackend,
    /// Pinecone index host, e.g. `https://chats-abc123.svc.us-east-1.pinecone.io`.
    #[serde(default)]
    pub pinecone_host: Option<String>,
    /// pgvector table name.
    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    "rag_vectors".to_string()
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::default(),
            pinecone_host: None,
            table: default_table(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    #[serde(default = "default_title_model")]
    pub title_model: String,
}

fn default_title_model() -> String {
    "gemini-1.5-flash-latest".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractionConfig {
    pub base_url: String,
    pub path: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:4000".to_string(),
            path: "extract".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8766,
        }
    }
}

impl ChatragConfig {
    /// Load from a TOML file, with `CHATRAG__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self, ChatragError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("CHATRAG").separator("__"))
            .build()?;
        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChatragError> {
        let ceiling = self.retrieval.purge_ceiling;
        if ceiling == 0 || ceiling > MAX_PURGE_CEILING {
            return Err(ConfigError::Message(format!(
                "retrieval.purge_ceiling must be between 1 and {}, got {}",
                MAX_PURGE_CEILING, ceiling
            ))
            .into());
        }
        Ok(())
    }
}
