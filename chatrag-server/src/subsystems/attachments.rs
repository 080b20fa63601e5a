//! Attachment subsystem: the out-of-band document path
//!
//! Each attachment key is sent to the extraction service and the returned
//! text is ingested tagged `type = "pdf"`. Keys are processed concurrently;
//! one failing key never stops the others. `spawn_attachment_ingest` runs
//! the whole batch on a detached task so a turn does not wait for it.

use std::sync::Arc;

use chatrag_core::extraction::{DocumentExtractor, ExtractionError};
use chatrag_core::index::{Metadata, MetadataValue};
use chrono::SecondsFormat;
use futures::future::join_all;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;

use super::ingest::{IngestError, IngestionPipeline};

pub const DOCUMENT_TYPE: &str = "pdf";

#[derive(Error, Debug)]
pub enum AttachmentError {
    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Ingest failed: {0}")]
    Ingest(#[from] IngestError),
}

/// Outcome of one attachment batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AttachmentReport {
    pub processed: usize,
    pub skipped_empty: usize,
    pub failed: usize,
    pub chunks: usize,
}

pub struct AttachmentIngestor {
    extractor: Arc<dyn DocumentExtractor>,
    ingestion: Arc<IngestionPipeline>,
}

impl AttachmentIngestor {
    pub fn new(extractor: Arc<dyn DocumentExtractor>, ingestion: Arc<IngestionPipeline>) -> Self {
        Self {
            extractor,
            ingestion,
        }
    }

    /// Extract one document and ingest its text. Returns the chunks written;
    /// a document with no text writes nothing and returns 0.
    pub async fn ingest_attachment(
        &self,
        chat_id: &str,
        file_key: &str,
        file_name: Option<&str>,
    ) -> Result<usize, AttachmentError> {
        let file_name = file_name.unwrap_or_else(|| file_key.rsplit('/').next().unwrap_or(file_key));
        let doc = self.extractor.extract(file_key).await?;

        if doc.text.trim().is_empty() {
            tracing::warn!(chat_id = %chat_id, file_name = %file_name, "No text content found in document");
            return Ok(0);
        }

        let mut metadata = Metadata::new();
        metadata.insert("type".into(), DOCUMENT_TYPE.into());
        metadata.insert("fileName".into(), file_name.into());
        metadata.insert("fileKey".into(), file_key.into());
        metadata.insert("source".into(), "attachment".into());
        metadata.insert("pages".into(), MetadataValue::from(doc.pages));
        metadata.insert("info".into(), doc.info.to_string().into());
        metadata.insert(
            "processedAt".into(),
            chrono::Utc::now()
                .to_rfc3339_opts(SecondsFormat::Millis, true)
                .into(),
        );

        let chunks = self.ingestion.ingest(chat_id, &doc.text, metadata).await?;

        tracing::info!(
            chat_id = %chat_id,
            file_name = %file_name,
            pages = doc.pages,
            chunks = chunks,
            "Processed attachment"
        );
        Ok(chunks)
    }

    /// Process every key concurrently, logging and counting failures.
    pub async fn ingest_attachments(&self, chat_id: &str, file_keys: &[String]) -> AttachmentReport {
        if file_keys.is_empty() {
            return AttachmentReport::default();
        }

        let results = join_all(
            file_keys
                .iter()
                .map(|key| self.ingest_attachment(chat_id, key, None)),
        )
        .await;

        let mut report = AttachmentReport::default();
        for (key, result) in file_keys.iter().zip(results) {
            match result {
                Ok(0) => report.skipped_empty += 1,
                Ok(n) => {
                    report.processed += 1;
                    report.chunks += n;
                }
                Err(e) => {
                    tracing::error!(chat_id = %chat_id, file_key = %key, error = %e, "Failed to process attachment");
                    report.failed += 1;
                }
            }
        }

        tracing::info!(
            chat_id = %chat_id,
            processed = report.processed,
            failed = report.failed,
            "Finished attachment batch"
        );
        report
    }
}

/// Run an attachment batch on a detached task.
pub fn spawn_attachment_ingest(
    ingestor: Arc<AttachmentIngestor>,
    chat_id: String,
    file_keys: Vec<String>,
) -> JoinHandle<AttachmentReport> {
    tokio::spawn(async move { ingestor.ingest_attachments(&chat_id, &file_keys).await })
}
