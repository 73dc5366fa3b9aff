//! Image illustration step — renders the configured prompt template and
//! writes the generated image to disk.
//!
//! Illustration is best-effort: any failure (generation, download, write)
//! logs a warning and yields `None`. The reply still goes out without an
//! image.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::llm::ImageModel;

/// Placeholder token in the prompt template, replaced with the extracted
/// detail (or the fallback phrase).
pub const PLACEHOLDER: &str = "[subject]";

/// Generates illustrative images for topic-related messages.
pub struct Illustrator {
    model: Arc<dyn ImageModel>,
    prompt_template: String,
    fallback_detail: String,
    output_dir: PathBuf,
}

impl Illustrator {
    pub fn new(
        model: Arc<dyn ImageModel>,
        prompt_template: String,
        fallback_detail: String,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            model,
            prompt_template,
            fallback_detail,
            output_dir,
        }
    }

    /// Substitute the placeholder with the detail, falling back to the
    /// configured generic phrase.
    pub fn render_prompt(&self, detail: Option<&str>) -> String {
        let subject = detail.unwrap_or(&self.fallback_detail);
        self.prompt_template.replace(PLACEHOLDER, subject)
    }

    /// Generate an image and write it under the output directory, named by
    /// current timestamp. Returns the file path, or `None` on any failure.
    pub async fn illustrate(&self, detail: Option<&str>) -> Option<PathBuf> {
        let prompt = self.render_prompt(detail);
        info!(prompt = %prompt, "Generating illustration");

        let bytes = match self.model.generate(&prompt).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(error = %e, "Image generation failed");
                return None;
            }
        };

        if let Err(e) = std::fs::create_dir_all(&self.output_dir) {
            warn!(error = %e, dir = %self.output_dir.display(), "Failed to create image directory");
            return None;
        }

        let filename = format!("illustration_{}.png", Utc::now().format("%Y%m%d_%H%M%S"));
        let path = self.output_dir.join(filename);

        if let Err(e) = std::fs::write(&path, &bytes) {
            warn!(error = %e, path = %path.display(), "Failed to write image file");
            return None;
        }

        info!(path = %path.display(), "Illustration written");
        Some(path)
    }
}
