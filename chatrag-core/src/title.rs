//! Conversation titles from the first user message.

use std::sync::Arc;

use crate::completion::{
    ChatCompletion, CompletionError, GeminiChatClient, GeminiChatConfig, GenerationSettings,
};
use crate::config::CompletionConfig;

/// Words too common to make a useful title.
const COMMON_WORDS: &[&str] = &[
    "this", "that", "with", "have", "will", "been", "from", "they", "know", "want", "good",
    "much", "some", "time", "very", "when", "come", "here", "just", "like", "long", "make",
    "many", "over", "such", "take", "than", "them", "well", "were",
];

pub struct TitleGenerator {
    completion: Arc<dyn ChatCompletion>,
}

impl TitleGenerator {
    pub fn new(completion: Arc<dyn ChatCompletion>) -> Self {
        Self { completion }
    }

    /// Gemini client tuned for short, stable titles.
    pub fn gemini(config: &CompletionConfig, api_key: Option<String>) -> Result<Self, CompletionError> {
        let mut chat_config = GeminiChatConfig::from_config(config, api_key);
        chat_config.model = config.title_model.clone();
        chat_config.settings = GenerationSettings {
            max_output_tokens: 20,
            temperature: 0.3,
            top_k: Some(40),
            top_p: Some(0.95),
        };
        Ok(Self::new(Arc::new(GeminiChatClient::new(chat_config)?)))
    }

    /// Ask the model for a title; any failure or blank answer falls back to
    /// [`simple_title`].
    pub async fn generate_title(&self, first_message: &str) -> String {
        let prompt = format!(
            "Generate a short, concise chat title (maximum 4 words) based on this user message. \
             The title should capture the main topic or intent. Only respond with the title, nothing else.\n\n\
             User message: \"{}\"",
            first_message
        );

        match self.completion.complete(&[], &prompt).await {
            Ok(raw) => {
                let title = clean_title(&raw);
                if title.is_empty() {
                    simple_title(first_message)
                } else {
                    title
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Title generation failed, using simple title");
                simple_title(first_message)
            }
        }
    }
}

/// Strip quotes and one trailing period.
fn clean_title(raw: &str) -> String {
    let unquoted: String = raw.trim().chars().filter(|c| *c != '"' && *c != '\'').collect();
    unquoted
        .strip_suffix('.')
        .unwrap_or(&unquoted)
        .trim()
        .to_string()
}

/// Up to three capitalised "meaningful" words of the message, or
/// `Chat <unix millis>` when there are none.
pub fn simple_title(message: &str) -> String {
    let words: Vec<String> = message
        .to_lowercase()
        .split(' ')
        .filter(|w| w.chars().count() > 3 && !COMMON_WORDS.contains(w))
        .take(3)
        .map(capitalize)
        .collect();

    if words.is_empty() {
        return format!("Chat {}", chrono::Utc::now().timestamp_millis());
    }
    words.join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::completion::HistoryTurn;

    struct CannedCompletion(Result<String, ()>);

    #[async_trait]
    impl ChatCompletion for CannedCompletion {
        async fn complete(&self, history: &[HistoryTurn], prompt: &str) -> Result<String, CompletionError> {
            assert!(history.is_empty());
            assert!(prompt.contains("maximum 4 words"));
            self.0.clone().map_err(|_| CompletionError::EmptyResponse)
        }
    }

    #[test]
    fn test_simple_title_drops_common_and_short_words() {
        assert_eq!(
            simple_title("I want to know about rust borrow checker rules"),
            "About Rust Borrow"
        );
    }

    #[test]
    fn test_simple_title_falls_back_to_timestamp() {
        let fallback = simple_title("a b c");
        assert!(fallback.starts_with("Chat "));
        assert!(fallback["Chat ".len()..].parse::<i64>().is_ok());
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("\"Rust Ownership Basics.\"\n"), "Rust Ownership Basics");
        assert_eq!(clean_title("'Trip Planning'"), "Trip Planning");
    }

    #[tokio::test]
    async fn test_generate_title_uses_model_output() {
        let generator = TitleGenerator::new(Arc::new(CannedCompletion(Ok("\"Travel Plans.\"".into()))));
        assert_eq!(generator.generate_title("help me plan travel").await, "Travel Plans");
    }

    #[tokio::test]
    async fn test_generate_title_falls_back_on_error() {
        let generator = TitleGenerator::new(Arc::new(CannedCompletion(Err(()))));
        assert_eq!(
            generator.generate_title("explain database indexing strategies").await,
            "Explain Database Indexing"
        );
    }
}
