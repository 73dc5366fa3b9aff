//! IMAP/SMTP mailbox — raw IMAP over rustls for fetching, lettre for
//! sending.
//!
//! Fetching does NOT mark messages seen; the poller calls `mark_read`
//! explicitly after a reply goes out, so an interrupted run re-polls the
//! same unread messages on restart. UID commands are used throughout so
//! identifiers stay stable across sessions.

use std::io::Write as IoWrite;
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use tracing::{debug, info};

use crate::config::{env_or, parsed_or, required};
use crate::error::{ConfigError, MailboxError};
use crate::mailbox::{MailEnvelope, Mailbox};

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;
type ImapError = Box<dyn std::error::Error + Send + Sync>;

/// IMAP/SMTP connection settings, built from environment variables.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl MailboxConfig {
    /// Build config from environment variables. Missing credentials are a
    /// fatal configuration error.
    pub fn from_env() -> Result<Self, ConfigError> {
        let imap_host = required("EMAIL_IMAP_HOST")?;
        let username = required("EMAIL_USERNAME")?;
        let password = required("EMAIL_PASSWORD")?;

        let smtp_host = std::env::var("EMAIL_SMTP_HOST")
            .unwrap_or_else(|_| imap_host.replace("imap", "smtp"));
        let from_address = env_or("EMAIL_FROM_ADDRESS", &username);

        Ok(Self {
            imap_host,
            imap_port: parsed_or("EMAIL_IMAP_PORT", 993)?,
            smtp_host,
            smtp_port: parsed_or("EMAIL_SMTP_PORT", 587)?,
            username,
            password,
            from_address,
        })
    }
}

/// Mailbox service over IMAP (inbound) and SMTP (outbound).
pub struct ImapMailbox {
    config: MailboxConfig,
}

impl ImapMailbox {
    pub fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    fn send_email(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        image_path: Option<&Path>,
    ) -> Result<(), MailboxError> {
        let send_err = |reason: String| MailboxError::SendFailed {
            to: to.to_string(),
            reason,
        };

        let builder = Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| send_err(format!("Invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| send_err(format!("Invalid to address: {e}")))?)
            .subject(subject);

        let email = match image_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| send_err(format!("Failed to read attachment: {e}")))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "illustration.png".to_string());
                let content_type = ContentType::parse("image/png")
                    .map_err(|e| send_err(format!("Bad attachment content type: {e}")))?;

                builder
                    .multipart(
                        MultiPart::mixed()
                            .singlepart(SinglePart::plain(body.to_string()))
                            .singlepart(Attachment::new(filename).body(bytes, content_type)),
                    )
                    .map_err(|e| send_err(format!("Failed to build email: {e}")))?
            }
            None => builder
                .body(body.to_string())
                .map_err(|e| send_err(format!("Failed to build email: {e}")))?,
        };

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.clone(),
        );
        let transport = SmtpTransport::relay(&self.config.smtp_host)
            .map_err(|e| send_err(format!("SMTP relay error: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        transport
            .send(&email)
            .map_err(|e| send_err(format!("SMTP send failed: {e}")))?;

        info!(to, subject, "Reply sent");
        Ok(())
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn list_unread(
        &self,
        sender_filter: Option<&str>,
    ) -> Result<Vec<MailEnvelope>, MailboxError> {
        let config = self.config.clone();
        let filter = sender_filter.map(|s| s.to_string());

        tokio::task::spawn_blocking(move || fetch_unread_imap(&config, filter.as_deref()))
            .await
            .map_err(|e| MailboxError::Fetch(format!("Fetch task panicked: {e}")))?
            .map_err(|e| MailboxError::Fetch(e.to_string()))
    }

    async fn send_reply(
        &self,
        to: &str,
        subject: &str,
        body: &str,
        image_path: Option<&Path>,
    ) -> Result<(), MailboxError> {
        self.send_email(to, subject, body, image_path)
    }

    async fn mark_read(&self, id: &str) -> Result<(), MailboxError> {
        let config = self.config.clone();
        let uid = id.to_string();
        let mark_err = |id: &str, reason: String| MailboxError::MarkReadFailed {
            id: id.to_string(),
            reason,
        };

        tokio::task::spawn_blocking(move || mark_read_imap(&config, &uid))
            .await
            .map_err(|e| mark_err(id, format!("Mark-read task panicked: {e}")))?
            .map_err(|e| mark_err(id, e.to_string()))
    }
}

// ── IMAP session (blocking — run under spawn_blocking) ──────────────

fn open_tls(config: &MailboxConfig) -> Result<TlsStream, ImapError> {
    use std::sync::Arc;

    let tcp = TcpStream::connect((&*config.imap_host, config.imap_port))?;
    tcp.set_read_timeout(Some(Duration::from_secs(30)))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name: rustls::pki_types::ServerName<'_> =
        rustls::pki_types::ServerName::try_from(config.imap_host.clone())?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)?;
    Ok(rustls::StreamOwned::new(conn, tcp))
}

fn read_line(tls: &mut TlsStream) -> Result<String, ImapError> {
    let mut buf = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        match std::io::Read::read(tls, &mut byte) {
            Ok(0) => return Err("IMAP connection closed".into()),
            Ok(_) => {
                buf.push(byte[0]);
                if buf.ends_with(b"\r\n") {
                    return Ok(String::from_utf8_lossy(&buf).to_string());
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn send_cmd(tls: &mut TlsStream, tag: &str, cmd: &str) -> Result<Vec<String>, ImapError> {
    let full = format!("{tag} {cmd}\r\n");
    IoWrite::write_all(tls, full.as_bytes())?;
    IoWrite::flush(tls)?;
    let mut lines = Vec::new();
    loop {
        let line = read_line(tls)?;
        let done = line.starts_with(tag);
        lines.push(line);
        if done {
            break;
        }
    }
    Ok(lines)
}

/// Log in and select INBOX. Leaves the session ready for UID commands.
fn open_session(config: &MailboxConfig) -> Result<TlsStream, ImapError> {
    let mut tls = open_tls(config)?;
    let _greeting = read_line(&mut tls)?;

    let login_resp = send_cmd(
        &mut tls,
        "A1",
        &format!("LOGIN \"{}\" \"{}\"", config.username, config.password),
    )?;
    if !login_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err("IMAP login failed".into());
    }

    let _select = send_cmd(&mut tls, "A2", "SELECT \"INBOX\"")?;
    Ok(tls)
}

/// Fetch unread messages, optionally restricted to a sender, without
/// touching the \Seen flag.
fn fetch_unread_imap(
    config: &MailboxConfig,
    sender_filter: Option<&str>,
) -> Result<Vec<MailEnvelope>, ImapError> {
    let mut tls = open_session(config)?;

    let search = match sender_filter {
        Some(sender) => format!("UID SEARCH UNSEEN FROM \"{sender}\""),
        None => "UID SEARCH UNSEEN".to_string(),
    };
    let search_resp = send_cmd(&mut tls, "A3", &search)?;

    let mut uids: Vec<String> = Vec::new();
    for line in &search_resp {
        if line.starts_with("* SEARCH") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() > 2 {
                uids.extend(parts[2..].iter().map(|s| s.to_string()));
            }
        }
    }

    let mut results = Vec::new();
    let mut tag_counter = 4_u32;

    for uid in &uids {
        let fetch_tag = format!("A{tag_counter}");
        tag_counter += 1;
        let fetch_resp = send_cmd(&mut tls, &fetch_tag, &format!("UID FETCH {uid} (RFC822)"))?;

        let raw: String = fetch_resp
            .iter()
            .skip(1)
            .take(fetch_resp.len().saturating_sub(2))
            .cloned()
            .collect();

        if let Some(parsed) = MessageParser::default().parse(raw.as_bytes()) {
            let envelope = parsed_to_envelope(uid, &parsed, sender_filter);
            if let Some(envelope) = envelope {
                results.push(envelope);
            }
        }
    }

    let logout_tag = format!("A{tag_counter}");
    let _ = send_cmd(&mut tls, &logout_tag, "LOGOUT");

    debug!(count = results.len(), "Fetched unread messages");
    Ok(results)
}

/// Mark one message as read.
fn mark_read_imap(config: &MailboxConfig, uid: &str) -> Result<(), ImapError> {
    let mut tls = open_session(config)?;

    let store_resp = send_cmd(&mut tls, "A3", &format!("UID STORE {uid} +FLAGS (\\Seen)"))?;
    if !store_resp.last().is_some_and(|l| l.contains("OK")) {
        return Err(format!("STORE failed for uid {uid}").into());
    }

    let _ = send_cmd(&mut tls, "A4", "LOGOUT");
    Ok(())
}

/// Convert a parsed message into an envelope, applying a client-side
/// sender check on top of the server-side SEARCH filter.
fn parsed_to_envelope(
    uid: &str,
    parsed: &mail_parser::Message,
    sender_filter: Option<&str>,
) -> Option<MailEnvelope> {
    let sender = extract_sender(parsed);
    if let Some(filter) = sender_filter
        && !sender.to_lowercase().contains(&filter.to_lowercase())
    {
        return None;
    }

    let subject = parsed.subject().unwrap_or("(no subject)").to_string();
    let body = extract_text(parsed);
    let attachments = extract_attachment_names(parsed);
    let thread_id = parsed
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| subject.clone());

    Some(MailEnvelope {
        id: uid.to_string(),
        sender,
        subject,
        body,
        attachments,
        thread_id,
    })
}

fn extract_sender(parsed: &mail_parser::Message) -> String {
    parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn extract_text(parsed: &mail_parser::Message) -> String {
    if let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    "(no readable content)".to_string()
}

fn extract_attachment_names(parsed: &mail_parser::Message) -> Vec<String> {
    parsed
        .attachments()
        .map(|part| {
            MimeHeaders::attachment_name(part)
                .unwrap_or("attachment")
                .to_string()
        })
        .collect()
}

/// Strip HTML tags from content (basic) and normalize whitespace.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(raw: &str) -> mail_parser::Message<'_> {
        MessageParser::default().parse(raw.as_bytes()).unwrap()
    }

    const PLAIN_EMAIL: &str = "From: Alice <alice@sponsor.com>\r\n\
        To: me@creator.com\r\n\
        Subject: BMW M4 sponsorship\r\n\
        Message-ID: <abc123@sponsor.com>\r\n\
        Content-Type: text/plain\r\n\
        \r\n\
        Interested in pricing for a sponsored video.\r\n";

    #[test]
    fn envelope_from_plain_email() {
        let parsed = parse(PLAIN_EMAIL);
        let envelope = parsed_to_envelope("7", &parsed, None).unwrap();
        assert_eq!(envelope.id, "7");
        assert_eq!(envelope.sender, "alice@sponsor.com");
        assert_eq!(envelope.subject, "BMW M4 sponsorship");
        assert!(envelope.body.contains("Interested in pricing"));
        assert!(envelope.attachments.is_empty());
        assert_eq!(envelope.thread_id, "abc123@sponsor.com");
    }

    #[test]
    fn envelope_sender_filter_mismatch_drops_message() {
        let parsed = parse(PLAIN_EMAIL);
        assert!(parsed_to_envelope("7", &parsed, Some("other@x.com")).is_none());
        assert!(parsed_to_envelope("7", &parsed, Some("alice@sponsor.com")).is_some());
    }

    #[test]
    fn envelope_sender_filter_is_case_insensitive() {
        let parsed = parse(PLAIN_EMAIL);
        assert!(parsed_to_envelope("7", &parsed, Some("Alice@Sponsor.COM")).is_some());
    }

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello <b>there</b></p>"), "Hello there");
    }

    #[test]
    fn strip_html_normalizes_whitespace() {
        assert_eq!(strip_html("<div>  a \n  b  </div>"), "a b");
    }

    #[test]
    fn strip_html_plain_passthrough() {
        assert_eq!(strip_html("no markup"), "no markup");
    }
}
