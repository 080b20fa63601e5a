//! Vector index: the store chunks are written to and searched in.
//!
//! Three backends share the `VectorIndex` trait:
//! - **memory**: in-process, for tests and single-node development
//! - **pinecone**: managed index over its REST data plane
//! - **pgvector**: Postgres table with a `vector(D)` column

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub mod pgvector;
pub mod pinecone;

pub use self::memory::InMemoryIndex;
pub use self::pgvector::PgVectorIndex;
pub use self::pinecone::PineconeIndex;

/// Flat metadata map. Pinecone only accepts scalar values and string lists.
pub type Metadata = BTreeMap<String, MetadataValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Text(String),
    Number(f64),
    Bool(bool),
    List(Vec<String>),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetadataValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        MetadataValue::Text(s)
    }
}

impl From<f64> for MetadataValue {
    fn from(n: f64) -> Self {
        MetadataValue::Number(n)
    }
}

impl From<u32> for MetadataValue {
    fn from(n: u32) -> Self {
        MetadataValue::Number(n as f64)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        MetadataValue::Bool(b)
    }
}

/// One stored chunk: id, embedding, and the metadata it is filtered and read back by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: Metadata,
}

/// Nearest-neighbour query. `filter` is a conjunction of equality matches.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub vector: Vec<f32>,
    pub top_k: usize,
    pub filter: Metadata,
    pub include_metadata: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMatch {
    pub id: String,
    pub score: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl QueryMatch {
    /// The chunk text stored under the `text` key, if any.
    pub fn text(&self) -> Option<&str> {
        self.metadata
            .as_ref()
            .and_then(|m| m.get("text"))
            .and_then(MetadataValue::as_str)
    }
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Index API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Index misconfigured: {0}")]
    Config(String),
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or overwrite records by id.
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), IndexError>;

    /// Return up to `top_k` matches satisfying the filter, best score first.
    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, IndexError>;

    /// Delete records by id. Unknown ids are ignored.
    async fn delete_many(&self, ids: &[String]) -> Result<(), IndexError>;

    fn dimensions(&self) -> usize;

    fn name(&self) -> &str;
}

/// Check every vector against the index dimension before anything is written.
pub(crate) fn check_dimensions(expected: usize, vectors: &[&[f32]]) -> Result<(), IndexError> {
    match vectors.iter().find(|v| v.len() != expected) {
        Some(v) => Err(IndexError::DimensionMismatch {
            expected,
            actual: v.len(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_value_untagged_serde() {
        let json = serde_json::json!({
            "chatId": "c1",
            "pages": 3,
            "seen": true,
            "tags": ["a", "b"]
        });
        let metadata: Metadata = serde_json::from_value(json).unwrap();

        assert_eq!(metadata["chatId"], MetadataValue::Text("c1".into()));
        assert_eq!(metadata["pages"], MetadataValue::Number(3.0));
        assert_eq!(metadata["seen"], MetadataValue::Bool(true));
        assert_eq!(
            metadata["tags"],
            MetadataValue::List(vec!["a".into(), "b".into()])
        );
    }

    #[test]
    fn test_query_match_text() {
        let mut metadata = Metadata::new();
        metadata.insert("text".into(), "hello".into());
        let m = QueryMatch {
            id: "1".into(),
            score: 0.9,
            metadata: Some(metadata),
        };
        assert_eq!(m.text(), Some("hello"));

        let bare = QueryMatch {
            id: "2".into(),
            score: 0.1,
            metadata: None,
        };
        assert_eq!(bare.text(), None);
    }

    #[test]
    fn test_check_dimensions() {
        let a = vec![0.0; 3];
        let b = vec![0.0; 2];
        assert!(check_dimensions(3, &[&a]).is_ok());
        assert!(matches!(
            check_dimensions(3, &[&a, &b]),
            Err(IndexError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
