//! OpenAI-backed implementations of `LanguageModel` and `ImageModel`.
//!
//! Chat completions for classification and drafting; the images endpoint
//! returns a short-lived URL which is downloaded for the raw bytes.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, ImageModel, LanguageModel,
};

const API_BASE: &str = "https://api.openai.com/v1";

/// Client for the OpenAI API, covering both traits.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: SecretString,
    chat_model: String,
    image_model: String,
}

impl OpenAiClient {
    pub fn new(api_key: SecretString, chat_model: String, image_model: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key,
            chat_model,
            image_model,
        }
    }

    fn request_error(&self, reason: impl std::fmt::Display) -> LlmError {
        LlmError::RequestFailed {
            provider: "openai".into(),
            reason: reason.to_string(),
        }
    }

    fn response_error(&self, reason: impl std::fmt::Display) -> LlmError {
        LlmError::InvalidResponse {
            provider: "openai".into(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiClient {
    fn model_name(&self) -> &str {
        &self.chat_model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = json!({
            "model": self.chat_model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });

        let response = self
            .http
            .post(format!("{API_BASE}/chat/completions"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?
            .error_for_status()
            .map_err(|e| self.request_error(e))?;

        let payload: serde_json::Value =
            response.json().await.map_err(|e| self.response_error(e))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| self.response_error("missing choices[0].message.content"))?
            .trim()
            .to_string();

        if content.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: "openai".into(),
            });
        }

        debug!(model = %self.chat_model, chars = content.len(), "Completion received");
        Ok(CompletionResponse { content })
    }
}

#[async_trait]
impl ImageModel for OpenAiClient {
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, LlmError> {
        let body = json!({
            "model": self.image_model,
            "prompt": prompt,
            "size": "1024x1024",
            "quality": "standard",
            "n": 1,
        });

        let response = self
            .http
            .post(format!("{API_BASE}/images/generations"))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.request_error(e))?
            .error_for_status()
            .map_err(|e| self.request_error(e))?;

        let payload: serde_json::Value =
            response.json().await.map_err(|e| self.response_error(e))?;

        let url = payload["data"][0]["url"]
            .as_str()
            .ok_or_else(|| self.response_error("missing data[0].url"))?;

        // The generation endpoint hands back a URL, not bytes.
        let bytes = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| self.request_error(e))?
            .error_for_status()
            .map_err(|e| self.request_error(e))?
            .bytes()
            .await
            .map_err(|e| self.response_error(e))?;

        if bytes.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: "openai".into(),
            });
        }

        debug!(model = %self.image_model, bytes = bytes.len(), "Image downloaded");
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_reports_chat_model_name() {
        let client = OpenAiClient::new(
            SecretString::from("sk-test"),
            "gpt-4o".into(),
            "dall-e-3".into(),
        );
        assert_eq!(client.model_name(), "gpt-4o");
    }

    #[test]
    fn chat_message_serializes_role_and_content() {
        let msg = ChatMessage::system("You classify emails.");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "system");
        assert_eq!(v["content"], "You classify emails.");
    }
}
