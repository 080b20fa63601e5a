//! Document text extraction: client for the PDF extraction service.
//!
//! The service is addressed as `GET {base_url}/{path}/{file key}` with the
//! key sent as a single percent-encoded path segment, and answers with
//! `{success, text, metadata: {pages, info}}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use thiserror::Error;

use crate::config::ExtractionConfig;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Invalid extraction service URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Extraction service returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("Extraction service returned an unsuccessful result")]
    Unsuccessful,
}

/// Text and document info returned for one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDocument {
    pub text: String,
    pub pages: u32,
    /// Free-form document info (title, author, ...). `{}` when absent.
    pub info: serde_json::Value,
}

#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, file_key: &str) -> Result<ExtractedDocument, ExtractionError>;
}

#[derive(Debug, Deserialize)]
struct ExtractionResponse {
    success: bool,
    #[serde(default)]
    text: String,
    #[serde(default)]
    metadata: Option<ExtractionMetadata>,
}

#[derive(Debug, Deserialize)]
struct ExtractionMetadata {
    #[serde(default)]
    pages: u32,
    #[serde(default)]
    info: Option<serde_json::Value>,
}

pub struct PdfServiceClient {
    client: Client,
    base_url: Url,
    path: String,
}

impl PdfServiceClient {
    pub fn new(config: &ExtractionConfig) -> Result<Self, ExtractionError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ExtractionError::InvalidUrl(format!("{}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ExtractionError::InvalidUrl(config.base_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url,
            path: config.path.trim_matches('/').to_string(),
        })
    }

    fn url_for(&self, file_key: &str) -> Result<Url, ExtractionError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ExtractionError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            for part in self.path.split('/').filter(|p| !p.is_empty()) {
                segments.push(part);
            }
            // push() percent-encodes '/' and friends, so the key stays one segment
            segments.push(file_key);
        }
        Ok(url)
    }
}

#[async_trait]
impl DocumentExtractor for PdfServiceClient {
    async fn extract(&self, file_key: &str) -> Result<ExtractedDocument, ExtractionError> {
        let url = self.url_for(file_key)?;
        tracing::debug!(file_key = %file_key, url = %url, "Requesting document extraction");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let body: ExtractionResponse = response.json().await?;
        if !body.success {
            return Err(ExtractionError::Unsuccessful);
        }

        let (pages, info) = match body.metadata {
            Some(m) => (m.pages, m.info.unwrap_or_else(|| serde_json::json!({}))),
            None => (0, serde_json::json!({})),
        };

        tracing::info!(
            file_key = %file_key,
            pages = pages,
            text_len = body.text.len(),
            "Document extraction succeeded"
        );

        Ok(ExtractedDocument {
            text: body.text,
            pages,
            info,
        })
    }
}
