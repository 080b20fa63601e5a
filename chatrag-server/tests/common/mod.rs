//! Deterministic fakes for the external collaborators.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatrag_core::completion::{ChatCompletion, CompletionError, HistoryTurn};
use chatrag_core::config::{
    ChatragConfig, ChunkingConfig, CompletionConfig, EmbeddingConfig, ExtractionConfig, HttpConfig,
    IndexConfig, RetrievalConfig, ServiceConfig,
};
use chatrag_core::embeddings::{EmbeddingBackend, EmbeddingError};
use chatrag_core::extraction::{DocumentExtractor, ExtractedDocument, ExtractionError};
use chatrag_core::index::{
    IndexError, IndexedRecord, InMemoryIndex, QueryMatch, QueryRequest, VectorIndex,
};
use chatrag_core::TitleGenerator;
use chatrag_server::services::{Collaborators, RagServices};

pub const DIMS: usize = 64;

pub fn test_config() -> ChatragConfig {
    ChatragConfig {
        service: ServiceConfig {
            socket_path: "/tmp/chatrag-test.sock".to_string(),
            log_level: "debug".to_string(),
        },
        embedding: EmbeddingConfig {
            model: "hash".to_string(),
            dimensions: DIMS as u32,
            max_input_tokens: 2048,
            max_retries: 0,
            retry_delay_ms: 10,
        },
        chunking: ChunkingConfig {
            chunk_size: 200,
            chunk_overlap: 40,
        },
        retrieval: RetrievalConfig::default(),
        index: IndexConfig::default(),
        completion: CompletionConfig {
            model: "fake".to_string(),
            temperature: 0.7,
            max_output_tokens: 1000,
            title_model: "fake".to_string(),
        },
        extraction: ExtractionConfig::default(),
        database: None,
        http: HttpConfig::default(),
    }
}

// ============================================================================
// Embedder: hashed bag of words
// ============================================================================

/// Each lowercase word bumps one of `DIMS` buckets, so texts sharing words
/// are similar and texts sharing none are orthogonal (barring collisions).
pub struct HashEmbedder;

fn bucket(word: &str) -> usize {
    // FNV-1a
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in word.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % DIMS as u64) as usize
}

#[async_trait]
impl EmbeddingBackend for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyInput);
        }
        let mut v = vec![0.0; DIMS];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            v[bucket(word)] += 1.0;
        }
        Ok(v)
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "hash"
    }
}

// ============================================================================
// Index wrapper that counts calls
// ============================================================================

pub struct CountingIndex {
    pub inner: InMemoryIndex,
    pub upserts: AtomicUsize,
    pub deletes: AtomicUsize,
}

impl CountingIndex {
    pub fn new() -> Self {
        Self {
            inner: InMemoryIndex::new(DIMS),
            upserts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn upsert_calls(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VectorIndex for CountingIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), IndexError> {
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.inner.upsert(records).await
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, IndexError> {
        self.inner.query(request).await
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), IndexError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete_many(ids).await
    }

    fn dimensions(&self) -> usize {
        DIMS
    }

    fn name(&self) -> &str {
        "counting"
    }
}

// ============================================================================
// Completion: scripted reply, records every call
// ============================================================================

pub struct ScriptedCompletion {
    reply: Option<String>,
    pub calls: Mutex<Vec<(Vec<HistoryTurn>, String)>>,
}

impl ScriptedCompletion {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.calls.lock().unwrap().last().map(|(_, p)| p.clone())
    }

    pub fn last_history(&self) -> Option<Vec<HistoryTurn>> {
        self.calls.lock().unwrap().last().map(|(h, _)| h.clone())
    }
}

#[async_trait]
impl ChatCompletion for ScriptedCompletion {
    async fn complete(&self, history: &[HistoryTurn], prompt: &str) -> Result<String, CompletionError> {
        self.calls
            .lock()
            .unwrap()
            .push((history.to_vec(), prompt.to_string()));
        match &self.reply {
            Some(r) => Ok(r.clone()),
            None => Err(CompletionError::QuotaExceeded("quota exhausted".to_string())),
        }
    }
}

// ============================================================================
// Extractor: keys starting with "bad" fail
// ============================================================================

pub struct FakeExtractor;

#[async_trait]
impl DocumentExtractor for FakeExtractor {
    async fn extract(&self, file_key: &str) -> Result<ExtractedDocument, ExtractionError> {
        let name = file_key.rsplit('/').next().unwrap_or(file_key);
        if name.starts_with("bad") {
            return Err(ExtractionError::Unsuccessful);
        }
        Ok(ExtractedDocument {
            text: format!("The document {} says the launch date is October ninth.", name),
            pages: 1,
            info: serde_json::json!({}),
        })
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct Harness {
    pub services: Arc<RagServices>,
    pub index: Arc<CountingIndex>,
    pub completion: Arc<ScriptedCompletion>,
}

pub fn harness(completion: ScriptedCompletion) -> Harness {
    let index = Arc::new(CountingIndex::new());
    let completion = Arc::new(completion);
    let titles = Arc::new(TitleGenerator::new(Arc::new(ScriptedCompletion::replying(
        "\"Launch Planning.\"",
    ))));

    let services = RagServices::with_collaborators(
        test_config(),
        Collaborators {
            embedder: Arc::new(HashEmbedder),
            index: index.clone(),
            extractor: Arc::new(FakeExtractor),
            completion: completion.clone(),
            titles,
        },
    )
    .expect("valid chunking config");

    Harness {
        services: Arc::new(services),
        index,
        completion,
    }
}

/// Poll until `chat_id` holds at least `min` records or a second passes.
pub async fn wait_for_records(index: &CountingIndex, chat_id: &str, min: usize) -> usize {
    let mut filter = chatrag_core::Metadata::new();
    filter.insert("chatId".to_string(), chat_id.into());

    let mut found = 0;
    for _ in 0..100 {
        found = index
            .query(QueryRequest {
                vector: vec![0.0; DIMS],
                top_k: 10_000,
                filter: filter.clone(),
                include_metadata: false,
            })
            .await
            .unwrap()
            .len();
        if found >= min {
            return found;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    found
}
