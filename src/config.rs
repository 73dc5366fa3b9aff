//! Configuration — environment variables and instruction templates, read
//! once at startup. Any missing required setting is fatal before the
//! polling loop starts.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::mailbox::imap_smtp::MailboxConfig;

/// Default topic keyword set for the relatedness pre-filter.
const DEFAULT_KEYWORDS: &[&str] = &[
    "car",
    "automotive",
    "vehicle",
    "auto",
    "motors",
    "toyota",
    "honda",
    "ford",
    "bmw",
    "mercedes",
    "tesla",
    "porsche",
    "audi",
    "lexus",
    "mustang",
    "sponsorship car",
];

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// OpenAI API key (chat + image endpoints).
    pub api_key: SecretString,
    /// Chat completion model for classification and drafting.
    pub chat_model: String,
    /// Image generation model.
    pub image_model: String,
    /// Only messages from this sender are processed.
    pub target_sender: String,
    /// Maximum messages processed per poll cycle.
    pub max_batch: usize,
    /// Delay after each processed message.
    pub message_delay: Duration,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
    /// Keyword set for the topic-relatedness pre-filter (lowercase).
    pub keywords: Vec<String>,
    /// Reply-drafting instructions (loaded from file).
    pub reply_instructions: String,
    /// Image prompt template with a `[subject]` placeholder (loaded from file).
    pub image_prompt_template: String,
    /// Substituted into the template when no detail was extracted.
    pub image_fallback_detail: String,
    /// Directory for generated image files.
    pub image_output_dir: PathBuf,
    /// Decision log database path.
    pub db_path: PathBuf,
    /// Read-only dashboard port.
    pub dashboard_port: u16,
    /// IMAP/SMTP settings.
    pub mailbox: MailboxConfig,
}

impl AppConfig {
    /// Build configuration from the environment and template files.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = SecretString::from(required("OPENAI_API_KEY")?);
        let target_sender = required("TARGET_SENDER")?;

        let instructions_path =
            env_or("INSTRUCTIONS_PATH", "config/instructions.txt");
        let image_instructions_path =
            env_or("IMAGE_INSTRUCTIONS_PATH", "config/instruction_image.txt");

        Ok(Self {
            api_key,
            chat_model: env_or("SPONSOR_ASSIST_MODEL", "gpt-4o"),
            image_model: env_or("SPONSOR_ASSIST_IMAGE_MODEL", "dall-e-3"),
            target_sender,
            max_batch: parsed_or("MAX_EMAILS_PER_BATCH", 10)?,
            message_delay: Duration::from_secs(parsed_or("RESPONSE_DELAY_SECS", 5)?),
            poll_interval: Duration::from_secs(parsed_or("POLL_INTERVAL_SECS", 5)?),
            keywords: keywords_from_env(),
            reply_instructions: read_template(&instructions_path)?,
            image_prompt_template: read_template(&image_instructions_path)?,
            image_fallback_detail: env_or("IMAGE_FALLBACK_DETAIL", "luxury car"),
            image_output_dir: PathBuf::from(env_or("IMAGE_OUTPUT_DIR", "generated_images")),
            db_path: PathBuf::from(env_or("SPONSOR_ASSIST_DB_PATH", "./data/decisions.db")),
            dashboard_port: parsed_or("DASHBOARD_PORT", 5050)?,
            mailbox: MailboxConfig::from_env()?,
        })
    }
}

/// Parse the keyword list from `TOPIC_KEYWORDS` (comma-separated), falling
/// back to the built-in set. Keywords are lowercased for matching.
pub fn keywords_from_env() -> Vec<String> {
    match std::env::var("TOPIC_KEYWORDS") {
        Ok(raw) => {
            let parsed = parse_keywords(&raw);
            if parsed.is_empty() {
                default_keywords()
            } else {
                parsed
            }
        }
        Err(_) => default_keywords(),
    }
}

/// The built-in keyword set, lowercased.
pub fn default_keywords() -> Vec<String> {
    DEFAULT_KEYWORDS.iter().map(|k| k.to_string()).collect()
}

/// Split a comma-separated keyword list, trimming and lowercasing.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

// ── Env helpers ─────────────────────────────────────────────────────

pub(crate) fn required(key: &str) -> Result<String, ConfigError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

pub(crate) fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}' is not a valid value"),
        }),
        Err(_) => Ok(default),
    }
}

fn read_template(path: &str) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::Template {
        path: path.to_string(),
        source: e,
    })
}
