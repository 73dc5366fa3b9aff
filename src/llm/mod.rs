//! Model service clients.
//!
//! `provider` defines the narrow traits the pipeline depends on; `openai`
//! implements them against the OpenAI chat-completions and image-generation
//! endpoints over reqwest.

pub mod openai;
pub mod provider;

pub use openai::OpenAiClient;
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, ImageModel, LanguageModel,
};
