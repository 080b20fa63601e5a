//! Chat completion: ordered history plus a prompt in, reply text out.
//!
//! `GeminiChatClient` talks to `generateContent`. Failures are classified so
//! callers can tell a bad key from quota exhaustion or a safety block.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CompletionConfig;
use crate::embeddings::GeminiErrorResponse;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// One prior exchange entry sent as chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("Missing API key")]
    MissingApiKey,

    #[error("Invalid API key: {0}")]
    InvalidApiKey(String),

    #[error("API quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Request was blocked by safety filters: {0}")]
    Blocked(String),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Empty response from model")]
    EmptyResponse,
}

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// Continue `history` with `prompt` as the next user turn.
    async fn complete(&self, history: &[HistoryTurn], prompt: &str) -> Result<String, CompletionError>;
}

/// Sampling settings sent as `generationConfig`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub max_output_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct GeminiChatConfig {
    pub api_key: String,
    pub model: String,
    pub settings: GenerationSettings,
}

impl GeminiChatConfig {
    pub fn from_config(config: &CompletionConfig, api_key: Option<String>) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .unwrap_or_default();
        Self {
            api_key,
            model: config.model.clone(),
            settings: GenerationSettings {
                max_output_tokens: config.max_output_tokens,
                temperature: config.temperature,
                top_k: None,
                top_p: None,
            },
        }
    }
}

// ============================================================================
// Gemini API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<Content>,
    generation_config: &'a GenerationSettings,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

const BLOCKING_FINISH_REASONS: &[&str] = &["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

fn classify_api_error(code: u16, message: String) -> CompletionError {
    let lowered = message.to_lowercase();
    if code == 429 || lowered.contains("quota") {
        CompletionError::QuotaExceeded(message)
    } else if message.contains("API_KEY") || lowered.contains("api key") {
        CompletionError::InvalidApiKey(message)
    } else if lowered.contains("blocked") {
        CompletionError::Blocked(message)
    } else {
        CompletionError::Api { code, message }
    }
}

// ============================================================================
// GeminiChatClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct GeminiChatClient {
    client: Client,
    config: GeminiChatConfig,
    base_url: String,
}

impl GeminiChatClient {
    pub fn new(config: GeminiChatConfig) -> Result<Self, CompletionError> {
        Self::with_base_url(config, GEMINI_BASE_URL.to_string())
    }

    pub fn with_base_url(config: GeminiChatConfig, base_url: String) -> Result<Self, CompletionError> {
        if config.api_key.is_empty() {
            return Err(CompletionError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            config,
            base_url,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }
}

#[async_trait]
impl ChatCompletion for GeminiChatClient {
    async fn complete(&self, history: &[HistoryTurn], prompt: &str) -> Result<String, CompletionError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.config.model, self.config.api_key
        );

        let mut contents: Vec<Content> = history
            .iter()
            .map(|turn| Content {
                role: Some(turn.role),
                parts: vec![Part {
                    text: turn.text.clone(),
                }],
            })
            .collect();
        contents.push(Content {
            role: Some(Role::User),
            parts: vec![Part {
                text: prompt.to_string(),
            }],
        });

        let request = GenerateRequest {
            contents,
            generation_config: &self.config.settings,
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let (code, message) = serde_json::from_str::<GeminiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| (e.code, e.message))
                .unwrap_or((status.as_u16(), error_body));

            tracing::error!(code = code, model = %self.config.model, message = %message, "Gemini generateContent error");
            return Err(classify_api_error(code, message));
        }

        let body: GenerateResponse = response.json().await?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CompletionError::Blocked(reason));
        }

        let candidate = body.candidates.into_iter().next().ok_or(CompletionError::EmptyResponse)?;

        if let Some(reason) = candidate
            .finish_reason
            .as_deref()
            .filter(|r| BLOCKING_FINISH_REASONS.contains(r))
        {
            return Err(CompletionError::Blocked(reason.to_string()));
        }

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(CompletionError::EmptyResponse);
        }

        Ok(text)
    }
}
