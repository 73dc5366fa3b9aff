//! Mailbox access — the external collaborator the poller reads from and
//! replies through.
//!
//! The `Mailbox` trait is the only surface the core depends on; the
//! IMAP/SMTP implementation lives in `imap_smtp`.

pub mod imap_smtp;

use std::path::Path;

use async_trait::async_trait;

use crate::error::MailboxError;

pub use imap_smtp::{ImapMailbox, MailboxConfig};

/// One unread message, read-only to the core.
#[derive(Debug, Clone)]
pub struct MailEnvelope {
    /// Mailbox-native identifier (IMAP UID), used for mark-read and dedup.
    pub id: String,
    /// Sender address.
    pub sender: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body (HTML stripped when no text part exists).
    pub body: String,
    /// Attachment file names, possibly empty.
    pub attachments: Vec<String>,
    /// Thread identifier (Message-ID header, or the subject as fallback).
    pub thread_id: String,
}

impl MailEnvelope {
    /// True when the message carries at least one attachment.
    pub fn has_attachments(&self) -> bool {
        !self.attachments.is_empty()
    }
}

/// Mailbox service operations the polling loop needs.
#[async_trait]
pub trait Mailbox: Send + Sync {
    /// List unread messages, optionally restricted to a sender filter.
    async fn list_unread(
        &self,
        sender_filter: Option<&str>,
    ) -> Result<Vec<MailEnvelope>, MailboxError>;

    /// Send a reply, with an optional image attachment.
    async fn send_reply(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        image_path: Option<&Path>,
    ) -> Result<(), MailboxError>;

    /// Mark a message as read.
    async fn mark_read(&self, id: &str) -> Result<(), MailboxError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_attachment_check() {
        let mut mail = MailEnvelope {
            id: "42".into(),
            sender: "a@x.com".into(),
            subject: "Hello".into(),
            body: "body".into(),
            attachments: vec![],
            thread_id: "t-1".into(),
        };
        assert!(!mail.has_attachments());
        mail.attachments.push("logo.png".into());
        assert!(mail.has_attachments());
    }
}
