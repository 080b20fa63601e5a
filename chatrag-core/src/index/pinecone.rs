//! Pinecone data-plane client (`/vectors/upsert`, `/query`, `/vectors/delete`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{check_dimensions, IndexError, IndexedRecord, Metadata, QueryMatch, QueryRequest, VectorIndex};

/// Pinecone caps upsert request size; 100 records of 768 floats stays well under it.
const UPSERT_BATCH: usize = 100;

/// Maximum ids per delete request.
const DELETE_BATCH: usize = 1000;

#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub host: String,
    pub api_key: String,
    pub dimensions: usize,
}

impl PineconeConfig {
    pub fn new(host: String, api_key: Option<String>, dimensions: usize) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("PINECONE_API_KEY").ok())
            .unwrap_or_default();
        Self {
            host: host.trim_end_matches('/').to_string(),
            api_key,
            dimensions,
        }
    }
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [IndexedRecord],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PineconeQuery<'a> {
    vector: &'a [f32],
    top_k: usize,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    filter: serde_json::Map<String, serde_json::Value>,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct PineconeQueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    ids: &'a [String],
}

pub struct PineconeIndex {
    client: Client,
    config: PineconeConfig,
}

impl PineconeIndex {
    pub fn new(config: PineconeConfig) -> Result<Self, IndexError> {
        if config.api_key.is_empty() {
            return Err(IndexError::Config("PINECONE_API_KEY is not set".to_string()));
        }
        if config.host.is_empty() {
            return Err(IndexError::Config("Pinecone host is not set".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response, IndexError> {
        let url = format!("{}{}", self.config.host, path);
        let response = self
            .client
            .post(&url)
            .header("Api-Key", &self.config.api_key)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::error!(code = status.as_u16(), path = path, message = %message, "Pinecone API error");
            return Err(IndexError::Api {
                code: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }
}

/// Equality filter in Pinecone's operator syntax: `{"key": {"$eq": value}}`.
fn to_pinecone_filter(filter: &Metadata) -> Result<serde_json::Map<String, serde_json::Value>, IndexError> {
    let mut out = serde_json::Map::new();
    for (key, value) in filter {
        out.insert(
            key.clone(),
            serde_json::json!({ "$eq": serde_json::to_value(value)? }),
        );
    }
    Ok(out)
}

#[async_trait]
impl VectorIndex for PineconeIndex {
    async fn upsert(&self, records: Vec<IndexedRecord>) -> Result<(), IndexError> {
        let vectors: Vec<&[f32]> = records.iter().map(|r| r.values.as_slice()).collect();
        check_dimensions(self.config.dimensions, &vectors)?;

        // A failed batch rolls back the batches before it, so a call never
        // leaves part of a document behind.
        let mut written = 0;
        for batch in records.chunks(UPSERT_BATCH) {
            if let Err(e) = self
                .post("/vectors/upsert", &UpsertRequest { vectors: batch })
                .await
            {
                if written > 0 {
                    let ids: Vec<String> = records[..written].iter().map(|r| r.id.clone()).collect();
                    if let Err(cleanup) = self.delete_many(&ids).await {
                        tracing::warn!(
                            orphaned = written,
                            error = %cleanup,
                            "Failed to roll back partial Pinecone upsert"
                        );
                    }
                }
                return Err(e);
            }
            written += batch.len();
        }

        tracing::debug!(count = records.len(), "Upserted vectors to Pinecone");
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<Vec<QueryMatch>, IndexError> {
        check_dimensions(self.config.dimensions, &[&request.vector])?;

        let body = PineconeQuery {
            vector: &request.vector,
            top_k: request.top_k,
            filter: to_pinecone_filter(&request.filter)?,
            include_metadata: request.include_metadata,
            include_values: false,
        };

        let response: PineconeQueryResponse = self.post("/query", &body).await?.json().await?;
        Ok(response.matches)
    }

    async fn delete_many(&self, ids: &[String]) -> Result<(), IndexError> {
        for batch in ids.chunks(DELETE_BATCH) {
            self.post("/vectors/delete", &DeleteRequest { ids: batch })
                .await?;
        }
        Ok(())
    }

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn name(&self) -> &str {
        "pinecone"
    }
}
