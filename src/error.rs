//! Error types for Sponsor Assist.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors. Always fatal — raised before the loop starts.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to read instruction template {path}: {source}")]
    Template {
        path: String,
        source: std::io::Error,
    },
}

/// Decision-log storage errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Failed to open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Decision record not found: id {0}")]
    NotFound(i64),

    #[error("Invalid limit: must be a positive integer")]
    InvalidLimit,
}

/// Mailbox transport errors (IMAP fetch, SMTP send, mark-read).
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("IMAP fetch failed: {0}")]
    Fetch(String),

    #[error("Failed to send reply to {to}: {reason}")]
    SendFailed { to: String, reason: String },

    #[error("Failed to mark message {id} as read: {reason}")]
    MarkReadFailed { id: String, reason: String },
}

/// Model service errors (chat completion and image generation).
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Per-message classification errors. Caught at the poller boundary —
/// a failure skips the message, never the loop.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// The disposition model call returned a label outside the three
    /// recognized names. Hard per-message error, never coerced.
    #[error("Model returned unrecognized disposition label: '{0}'")]
    MalformedDisposition(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
