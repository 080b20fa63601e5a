use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::completion::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Agent,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Agent => "agent",
        }
    }

    /// Role name the completion API expects for this author.
    pub fn completion_role(&self) -> Role {
        match self {
            MessageRole::User => Role::User,
            MessageRole::Agent => Role::Model,
        }
    }
}

/// A stored chat message as handed to a turn, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: i64,
    pub content: String,
    pub role: MessageRole,
    pub created_at: DateTime<Utc>,
    /// Object-storage keys of files attached to this message.
    #[serde(default)]
    pub files: Vec<String>,
}

impl ChatMessage {
    pub fn new(id: i64, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id,
            content: content.into(),
            role,
            created_at: Utc::now(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Attachment keys the document path accepts.
    pub fn pdf_attachments(&self) -> impl Iterator<Item = &String> {
        self.files
            .iter()
            .filter(|key| key.to_ascii_lowercase().ends_with(".pdf"))
    }
}
