//! Provider traits and request/response types for model services.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::LlmError;

/// A single chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

/// A completion request. Classification calls pin temperature to zero and a
/// small token budget; drafting uses a creative temperature and more room.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            temperature: 0.0,
            max_tokens: 256,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Text completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Model identifier, for logging.
    fn model_name(&self) -> &str;

    /// Run one completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Image generation service.
#[async_trait]
pub trait ImageModel: Send + Sync {
    /// Generate an image for the prompt, returning the raw bytes.
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_defaults() {
        let req = CompletionRequest::new(vec![ChatMessage::user("hi")]);
        assert_eq!(req.temperature, 0.0);
        assert_eq!(req.max_tokens, 256);
    }

    #[test]
    fn request_builder_overrides() {
        let req = CompletionRequest::new(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
        ])
        .with_temperature(0.7)
        .with_max_tokens(500);
        assert_eq!(req.temperature, 0.7);
        assert_eq!(req.max_tokens, 500);
        assert_eq!(req.messages[0].role, "system");
        assert_eq!(req.messages[1].role, "user");
    }
}
