//! Shared pipeline types.

use std::path::PathBuf;

use crate::taxonomy::Disposition;

/// Result of classifying one message.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    /// Drafted reply text, meant to be sent as-is.
    pub reply_body: String,
    /// Generated illustration, when the message was topic-related and
    /// generation succeeded.
    pub image_path: Option<PathBuf>,
    /// The decided disposition.
    pub disposition: Disposition,
}
