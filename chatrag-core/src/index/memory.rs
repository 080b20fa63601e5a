use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{check_dimensions, IndexError, IndexedRecord, Metadata, QueryMatch, QueryRequest, VectorIndex};

/// In-process index with exact cosine search.
pub struct InMemoryIndex {
    dimensions: usize,
    records: RwLock<HashMap<String, IndexedRecord>>,
}

impl InMemoryIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<IndexedRecord> {
        self.records.read().await.get(id).cloned()
    }
}

fn matches_filter(metadata: &Metadata, filter: &Metadata) -> bool {
    filter
        .iter()
        .all(|(key, value)| metadata.get(key) == Some(value))
}

/// Cosine similarity; a zero-norm vector scores 0 against everything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), IndexError> {
        let vectors: Vec<&[f32]> = records.iter().map(|r| r.values.as_slice()).collect();
        check_dimensions(self.dimensions, &vectors)?;

        let mut store = self.records.write().await;
        for record in records {
            store.insert(record.id.clone(), record);
        }
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, IndexError> {
        check_dimensions(self.dimensions, &[&request.vector])?;

        let store = self.records.read().await;
        let mut matches: Vec<QueryMatch> = store
            .values()
            .filter(|r| matches_filter(&r.metadata, &request.filter))
            .map(|r| QueryMatch {
                id: r.id.clone(),
                score: cosine_similarity(&request.vector, &r.values),
                metadata: request.include_metadata.then(|| r.metadata.clone()),
            })
            .collect();

        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        matches.truncate(request.top_k);
        Ok(matches)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), IndexError> {
        let mut store = self.records.write().await;
        for id in ids {
            store.remove(id);
        }
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "memory"
    }
}
