//! Polling loop — drives the whole assistant.
//!
//! Two states: `Idle` (waiting out the inter-poll delay) and `Polling`
//! (working through one batch). Messages are processed strictly in fetch
//! order, one at a time, with a courtesy delay after each. Every
//! per-message error is non-fatal; the loop only stops on the shutdown
//! flag, checked before each cycle and between messages.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::mailbox::{MailEnvelope, Mailbox};
use crate::pipeline::classifier::{EmailClassifier, validate_reply};
use crate::store::DecisionLog;

/// Poller timing and filtering settings.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Only messages from this sender are processed.
    pub target_sender: String,
    /// Maximum messages per poll cycle.
    pub max_batch: usize,
    /// Delay after each processed message.
    pub message_delay: Duration,
    /// Delay between poll cycles.
    pub poll_interval: Duration,
}

/// Loop state, for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Idle,
    Polling,
}

/// The polling driver.
pub struct Poller {
    mailbox: Arc<dyn Mailbox>,
    classifier: Arc<EmailClassifier>,
    log: Arc<DecisionLog>,
    config: PollerConfig,
    /// Message ids already handed to the pipeline during this process
    /// lifetime. Not persisted — a restart re-polls whatever is still
    /// unread, which is accepted behavior.
    seen: HashSet<String>,
    state: PollerState,
}

impl Poller {
    pub fn new(
        mailbox: Arc<dyn Mailbox>,
        classifier: Arc<EmailClassifier>,
        log: Arc<DecisionLog>,
        config: PollerConfig,
    ) -> Self {
        Self {
            mailbox,
            classifier,
            log,
            config,
            seen: HashSet::new(),
            state: PollerState::Idle,
        }
    }

    /// Current loop state.
    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Run until the shutdown flag is set.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) {
        info!(
            sender = %self.config.target_sender,
            interval_secs = self.config.poll_interval.as_secs(),
            "Polling loop started"
        );

        while !shutdown.load(Ordering::Relaxed) {
            self.state = PollerState::Polling;
            self.poll_once(&shutdown).await;
            self.state = PollerState::Idle;

            tokio::time::sleep(self.config.poll_interval).await;
        }

        info!("Polling loop stopped");
    }

    /// Fetch and process one batch. Returns only after every fetched
    /// message was processed to completion or explicitly skipped.
    pub async fn poll_once(&mut self, shutdown: &AtomicBool) {
        let batch = match self
            .mailbox
            .list_unread(Some(&self.config.target_sender))
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Failed to list unread messages");
                return;
            }
        };

        if batch.is_empty() {
            debug!("No new messages");
            return;
        }
        info!(count = batch.len(), "New messages fetched");

        for mail in batch.into_iter().take(self.config.max_batch) {
            if shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested — stopping mid-batch");
                return;
            }

            if !self.seen.insert(mail.id.clone()) {
                debug!(id = %mail.id, "Already handled this run — skipping");
                continue;
            }

            self.process_one(&mail).await;
            tokio::time::sleep(self.config.message_delay).await;
        }
    }

    /// Classify, log, reply, mark read — in that order.
    async fn process_one(&self, mail: &MailEnvelope) {
        info!(id = %mail.id, subject = %mail.subject, "Processing message");

        let outcome = match self.classifier.classify(mail).await {
            Ok(outcome) => outcome,
            Err(PipelineError::MalformedDisposition(label)) => {
                // Signals unreliable upstream classification; surfaced, not
                // coerced, and no decision row is written.
                error!(
                    id = %mail.id,
                    label = %label,
                    "Model returned malformed disposition — skipping message"
                );
                return;
            }
            Err(e) => {
                warn!(id = %mail.id, error = %e, "Classification failed — skipping message");
                return;
            }
        };

        // The log captures what we decided, independent of delivery.
        if let Err(e) = self.log.append(&mail.subject, outcome.disposition).await {
            error!(
                id = %mail.id,
                error = %e,
                "Failed to record decision — audit trail entry lost"
            );
        }

        if !validate_reply(&outcome.reply_body) {
            warn!(id = %mail.id, "Drafted reply failed validation — not sending");
            remove_image(outcome.image_path.as_deref());
            return;
        }

        let reply_subject = format!("Re: {}", mail.subject);
        match self
            .mailbox
            .send_reply(
                &mail.sender,
                &reply_subject,
                &outcome.reply_body,
                outcome.image_path.as_deref(),
            )
            .await
        {
            Ok(()) => {
                info!(id = %mail.id, to = %mail.sender, "Reply sent");
                if let Err(e) = self.mailbox.mark_read(&mail.id).await {
                    // The message may be reprocessed next poll; duplicate
                    // replies are accepted here.
                    warn!(id = %mail.id, error = %e, "Failed to mark message read");
                }
                remove_image(outcome.image_path.as_deref());
            }
            Err(e) => {
                error!(id = %mail.id, error = %e, "Failed to send reply");
            }
        }
    }
}

/// Delete a generated image file once it is no longer needed.
fn remove_image(path: Option<&std::path::Path>) {
    if let Some(path) = path {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Cleaned up generated image"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to clean up image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::path::Path;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::error::{LlmError, MailboxError};
    use crate::llm::{CompletionRequest, CompletionResponse, ImageModel, LanguageModel};
    use crate::pipeline::Illustrator;
    use crate::taxonomy::Disposition;

    // ── Mocks ───────────────────────────────────────────────────────

    #[derive(Debug, Clone)]
    struct SentReply {
        to: String,
        subject: String,
        with_image: bool,
    }

    /// In-memory mailbox: serves a fixed unread batch, records sends and
    /// mark-reads.
    struct MockMailbox {
        unread: Mutex<Vec<MailEnvelope>>,
        sent: Mutex<Vec<SentReply>>,
        marked_read: Mutex<Vec<String>>,
    }

    impl MockMailbox {
        fn new(unread: Vec<MailEnvelope>) -> Self {
            Self {
                unread: Mutex::new(unread),
                sent: Mutex::new(Vec::new()),
                marked_read: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Mailbox for MockMailbox {
        async fn list_unread(
            &self,
            _sender_filter: Option<&str>,
        ) -> Result<Vec<MailEnvelope>, MailboxError> {
            Ok(self.unread.lock().unwrap().clone())
        }

        async fn send_reply(
            &self,
            to: &str,
            subject: &str,
            _body: &str,
            image_path: Option<&Path>,
        ) -> Result<(), MailboxError> {
            self.sent.lock().unwrap().push(SentReply {
                to: to.to_string(),
                subject: subject.to_string(),
                with_image: image_path.is_some(),
            });
            Ok(())
        }

        async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
            self.marked_read.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    /// LLM stub: classifies by fixed rules. Replies with "MAYBE" on the
    /// disposition call when the message body mentions a knife, so a
    /// malformed-label path can sit next to well-formed ones in a batch.
    struct StubLlm {
        reply: String,
    }

    impl StubLlm {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let system = &request.messages[0].content;
            let user = &request.messages[1].content;
            let content = if system.contains("'true' or 'false'") {
                "false".to_string()
            } else if system.contains("detail extractor") {
                "none".to_string()
            } else if system.contains("NEGOTIATION") {
                if user.contains("knife") {
                    "MAYBE".to_string()
                } else {
                    "NEGOTIATION".to_string()
                }
            } else {
                self.reply.clone()
            };
            Ok(CompletionResponse { content })
        }
    }

    struct NoopImageModel;

    #[async_trait]
    impl ImageModel for NoopImageModel {
        async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, LlmError> {
            Ok(vec![0])
        }
    }

    fn mail(id: &str, subject: &str, body: &str) -> MailEnvelope {
        MailEnvelope {
            id: id.into(),
            sender: "a@x.com".into(),
            subject: subject.into(),
            body: body.into(),
            attachments: vec![],
            thread_id: format!("t-{id}"),
        }
    }

    async fn poller_with(
        mailbox: Arc<MockMailbox>,
        reply: &str,
    ) -> (Poller, Arc<DecisionLog>) {
        let log = Arc::new(DecisionLog::open_in_memory().await.unwrap());
        let tmp = std::env::temp_dir();
        let illustrator = Arc::new(Illustrator::new(
            Arc::new(NoopImageModel),
            "A photo of [subject]".into(),
            "luxury car".into(),
            tmp,
        ));
        let classifier = Arc::new(EmailClassifier::new(
            Arc::new(StubLlm::new(reply)),
            illustrator,
            crate::config::default_keywords(),
            "Reply politely.".into(),
        ));
        let config = PollerConfig {
            target_sender: "a@x.com".into(),
            max_batch: 10,
            message_delay: Duration::from_millis(0),
            poll_interval: Duration::from_millis(0),
        };
        let poller = Poller::new(mailbox, classifier, Arc::clone(&log), config);
        (poller, log)
    }

    #[tokio::test]
    async fn batch_processed_in_order_logged_and_marked_read() {
        let mailbox = Arc::new(MockMailbox::new(vec![
            mail("1", "First inquiry", "hello"),
            mail("2", "Second inquiry", "hello again"),
        ]));
        let (mut poller, log) = poller_with(Arc::clone(&mailbox),
            "Thanks for reaching out, happy to talk details.").await;

        poller.poll_once(&AtomicBool::new(false)).await;

        let sent = mailbox.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].subject, "Re: First inquiry");
        assert_eq!(sent[1].subject, "Re: Second inquiry");
        assert_eq!(sent[0].to, "a@x.com");
        assert!(!sent[0].with_image);

        assert_eq!(
            mailbox.marked_read.lock().unwrap().clone(),
            vec!["1".to_string(), "2".to_string()]
        );

        let records = log.list_all().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.disposition == Disposition::Negotiation));
    }

    #[tokio::test]
    async fn malformed_disposition_skips_message_and_continues() {
        let mailbox = Arc::new(MockMailbox::new(vec![
            mail("1", "Knife brand promo", "custom knife sponsorship"),
            mail("2", "Normal inquiry", "regular question"),
        ]));
        let (mut poller, log) = poller_with(Arc::clone(&mailbox),
            "Thanks for reaching out, happy to talk details.").await;

        poller.poll_once(&AtomicBool::new(false)).await;

        // First message: no reply, no mark-read, no decision row
        let sent = mailbox.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Re: Normal inquiry");
        assert_eq!(
            mailbox.marked_read.lock().unwrap().clone(),
            vec!["2".to_string()]
        );
        let records = log.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Normal inquiry");
    }

    #[tokio::test]
    async fn seen_messages_not_reprocessed_within_one_run() {
        let mailbox = Arc::new(MockMailbox::new(vec![mail("1", "Inquiry", "hello")]));
        let (mut poller, log) = poller_with(Arc::clone(&mailbox),
            "Thanks for reaching out, happy to talk details.").await;

        let shutdown = AtomicBool::new(false);
        poller.poll_once(&shutdown).await;
        poller.poll_once(&shutdown).await;

        assert_eq!(mailbox.sent.lock().unwrap().len(), 1);
        assert_eq!(log.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_reply_is_logged_but_not_sent() {
        let mailbox = Arc::new(MockMailbox::new(vec![mail("1", "Inquiry", "hello")]));
        let (mut poller, log) = poller_with(Arc::clone(&mailbox), "ok").await;

        poller.poll_once(&AtomicBool::new(false)).await;

        assert!(mailbox.sent.lock().unwrap().is_empty());
        assert!(mailbox.marked_read.lock().unwrap().is_empty());
        // The decision itself is still recorded
        let records = log.list_all().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Inquiry");
    }

    #[tokio::test]
    async fn batch_truncated_to_max_batch() {
        let mailbox = Arc::new(MockMailbox::new(vec![
            mail("1", "One", "x"),
            mail("2", "Two", "x"),
            mail("3", "Three", "x"),
        ]));
        let (mut poller, _log) = poller_with(Arc::clone(&mailbox),
            "Thanks for reaching out, happy to talk details.").await;
        poller.config.max_batch = 2;

        poller.poll_once(&AtomicBool::new(false)).await;
        assert_eq!(mailbox.sent.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_between_messages() {
        let mailbox = Arc::new(MockMailbox::new(vec![mail("1", "One", "x")]));
        let (mut poller, _log) = poller_with(Arc::clone(&mailbox),
            "Thanks for reaching out, happy to talk details.").await;

        poller.poll_once(&AtomicBool::new(true)).await;
        assert!(mailbox.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn poller_starts_idle() {
        let mailbox = Arc::new(MockMailbox::new(vec![]));
        let (poller, _log) = poller_with(mailbox, "unused").await;
        assert_eq!(poller.state(), PollerState::Idle);
    }
}
