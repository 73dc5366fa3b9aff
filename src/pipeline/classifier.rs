//! Email classifier — the decision procedure at the heart of the assistant.
//!
//! Four model decision points with narrow output contracts, plus the
//! conditional illustration step. Classification calls pin temperature to
//! zero so outputs are reproducible; reply drafting runs warm since the
//! output is prose, not a value to parse.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::{ChatMessage, CompletionRequest, LanguageModel};
use crate::mailbox::MailEnvelope;
use crate::pipeline::illustrator::Illustrator;
use crate::pipeline::types::PipelineOutcome;
use crate::taxonomy::Disposition;

/// Temperature for classification calls (relatedness, extraction, disposition).
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Temperature for reply drafting.
const REPLY_TEMPERATURE: f32 = 0.7;

const RELATEDNESS_MAX_TOKENS: u32 = 10;
const DETAIL_MAX_TOKENS: u32 = 50;
const DISPOSITION_MAX_TOKENS: u32 = 20;
const REPLY_MAX_TOKENS: u32 = 500;

/// Minimum accepted reply length; anything shorter is treated as truncated.
const MIN_REPLY_LEN: usize = 10;

/// Literal the extraction call returns when no detail was found.
const NO_DETAIL_LITERAL: &str = "none";

/// Classifies one message into a reply, an optional illustration, and a
/// disposition.
pub struct EmailClassifier {
    llm: Arc<dyn LanguageModel>,
    illustrator: Arc<Illustrator>,
    keywords: Vec<String>,
    reply_instructions: String,
}

impl EmailClassifier {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        illustrator: Arc<Illustrator>,
        keywords: Vec<String>,
        reply_instructions: String,
    ) -> Self {
        Self {
            llm,
            illustrator,
            keywords,
            reply_instructions,
        }
    }

    /// Run the full pipeline for one message.
    ///
    /// Each message is classified independently; a failure here leaves no
    /// partial state and the caller skips to the next message.
    pub async fn classify(&self, mail: &MailEnvelope) -> Result<PipelineOutcome, PipelineError> {
        let related = self.is_topic_related(mail).await?;

        let detail = if related {
            self.extract_detail(mail).await
        } else {
            None
        };

        let disposition = self.classify_disposition(mail).await?;
        info!(
            subject = %mail.subject,
            sender = %mail.sender,
            disposition = %disposition,
            "Disposition decided"
        );

        let reply_body = self.draft_reply(mail).await?;

        let image_path = if related {
            self.illustrator.illustrate(detail.as_deref()).await
        } else {
            None
        };

        Ok(PipelineOutcome {
            reply_body,
            image_path,
            disposition,
        })
    }

    /// Two-stage relatedness gate: a free keyword scan, then one strict
    /// true/false model call. Most mail never reaches the model.
    async fn is_topic_related(&self, mail: &MailEnvelope) -> Result<bool, PipelineError> {
        if !self.keyword_match(mail) {
            debug!(subject = %mail.subject, "No topic keywords — skipping relatedness model call");
            return Ok(false);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(RELATEDNESS_SYSTEM_PROMPT),
            ChatMessage::user(build_relatedness_prompt(mail)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(RELATEDNESS_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let related = response.content.trim().eq_ignore_ascii_case("true");

        if related {
            info!(subject = %mail.subject, sender = %mail.sender, "Topic-related message detected");
        }
        Ok(related)
    }

    /// True when subject or body contains any configured keyword.
    fn keyword_match(&self, mail: &MailEnvelope) -> bool {
        let subject = mail.subject.to_lowercase();
        let body = mail.body.to_lowercase();
        self.keywords
            .iter()
            .any(|k| subject.contains(k) || body.contains(k))
    }

    /// Extract a short detail phrase. The model answers with the phrase or
    /// the literal `none`. A model failure degrades to no detail — the
    /// detail only enriches the illustration, so it is not worth failing
    /// the message over.
    async fn extract_detail(&self, mail: &MailEnvelope) -> Option<String> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(EXTRACTION_SYSTEM_PROMPT),
            ChatMessage::user(build_extraction_prompt(mail)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(DETAIL_MAX_TOKENS);

        let content = match self.llm.complete(request).await {
            Ok(response) => response.content.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "Detail extraction failed — continuing without detail");
                return None;
            }
        };

        if content.eq_ignore_ascii_case(NO_DETAIL_LITERAL) {
            return None;
        }
        debug!(detail = %content, "Extracted detail");
        Some(content)
    }

    /// Decide the disposition. Attachments short-circuit to `AssetProvided`
    /// without a model call — an attachment is itself proof an asset was
    /// provided. An unrecognized model label is a hard per-message error.
    async fn classify_disposition(
        &self,
        mail: &MailEnvelope,
    ) -> Result<Disposition, PipelineError> {
        if mail.has_attachments() {
            info!(
                subject = %mail.subject,
                count = mail.attachments.len(),
                "Attachments present — disposition is Asset Provided"
            );
            return Ok(Disposition::AssetProvided);
        }

        let request = CompletionRequest::new(vec![
            ChatMessage::system(DISPOSITION_SYSTEM_PROMPT),
            ChatMessage::user(build_disposition_prompt(mail)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(DISPOSITION_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        let label = response.content.trim();

        Disposition::from_model_label(label)
            .ok_or_else(|| PipelineError::MalformedDisposition(label.to_string()))
    }

    /// Draft the reply with the configured instructions template.
    async fn draft_reply(&self, mail: &MailEnvelope) -> Result<String, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(REPLY_SYSTEM_PROMPT),
            ChatMessage::user(build_reply_prompt(mail, &self.reply_instructions)),
        ])
        .with_temperature(REPLY_TEMPERATURE)
        .with_max_tokens(REPLY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        Ok(response.content)
    }
}

/// A drafted reply is accepted only if non-empty and long enough to be a
/// real message.
pub fn validate_reply(reply: &str) -> bool {
    let trimmed = reply.trim();
    !trimmed.is_empty() && trimmed.len() >= MIN_REPLY_LEN
}

// ── Prompt construction ─────────────────────────────────────────────

const RELATEDNESS_SYSTEM_PROMPT: &str =
    "You are a sponsorship email analyzer. Only respond with 'true' or 'false'.";

const EXTRACTION_SYSTEM_PROMPT: &str =
    "You are a detail extractor. Only output the requested details in the format specified, nothing else.";

const DISPOSITION_SYSTEM_PROMPT: &str =
    "You are an email action classifier. Only respond with one of: NEGOTIATION, REJECTED, or ASSET_PROVIDED";

const REPLY_SYSTEM_PROMPT: &str =
    "You are a professional email assistant. Your responses should be clear, concise, and appropriate for business communication.";

fn build_relatedness_prompt(mail: &MailEnvelope) -> String {
    format!(
        "Analyze if this email is specifically about car sponsorship or automotive promotion.\n\
         Consider both the subject and content carefully.\n\n\
         Email Subject: {}\n\
         Email Content: {}\n\n\
         Response format: Only respond with 'true' if it's definitely about car sponsorship/promotion, or 'false' otherwise.",
        mail.subject, mail.body
    )
}

fn build_extraction_prompt(mail: &MailEnvelope) -> String {
    format!(
        "Extract the car details (brand, model, and color if available) from this email content.\n\
         If multiple cars are mentioned, focus on the main one being sponsored.\n\
         Format the response as a single line with just the car details, e.g., \"Red Tesla Model 3\" or \"BMW M4 Competition\".\n\
         If no specific car details are found, respond with \"none\".\n\n\
         Email subject: {}\n\
         Email content: {}",
        mail.subject, mail.body
    )
}

fn build_disposition_prompt(mail: &MailEnvelope) -> String {
    format!(
        "Analyze this email and determine the appropriate action to take:\n\n\
         Email Subject: {}\n\
         Email Content: {}\n\n\
         Choose ONE action from these options:\n\
         1. NEGOTIATION - If the email requires price negotiation\n\
         2. REJECTED - If we should decline the opportunity\n\
         3. ASSET_PROVIDED - If assets are being provided or it is about car sponsorship\n\n\
         Respond with ONLY the action name, nothing else.",
        mail.subject, mail.body
    )
}

fn build_reply_prompt(mail: &MailEnvelope, instructions: &str) -> String {
    format!(
        "Based on these instructions:\n{instructions}\n\n\
         Please analyze this email and generate an appropriate response:\n\
         From: {}\n\
         Subject: {}\n\
         Content: {}\n\n\
         Generate a professional and appropriate response following the instructions.\n\
         The response should be in a format ready to be sent as an email.",
        mail.sender, mail.subject, mail.body
    )
}
