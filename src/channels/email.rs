//! Email source: IMAP over TLS for listing and read marks, SMTP via lettre
//! for sending.
//!
//! Every port call opens its own IMAP session on the blocking pool and logs
//! out afterwards. Bodies are fetched with `BODY.PEEK[]`, so listing never
//! flips the `\Seen` flag; only [`EmailSource::mark_as_read`] does.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use mail_parser::{MessageParser, MimeHeaders};
use rustls_pki_types::ServerName;
use secrecy::ExposeSecret;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::channels::EmailSource;
use crate::channels::email_types::{EmailMessage, strip_html};
use crate::config::EmailConfig;
use crate::error::ChannelError;

const CHANNEL: &str = "email";

/// Read timeout for a single IMAP response line.
const IMAP_READ_TIMEOUT: Duration = Duration::from_secs(30);

// ── Source ──────────────────────────────────────────────────────────

/// IMAP + SMTP mail source.
pub struct ImapEmailSource {
    config: EmailConfig,
}

impl ImapEmailSource {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EmailSource for ImapEmailSource {
    async fn fetch(&self, label: &str, unread_only: bool, max_results: usize) -> Vec<EmailMessage> {
        let cfg = self.config.clone();
        let mailbox = label.to_string();
        let result = tokio::task::spawn_blocking(move || {
            fetch_imap(&cfg, &mailbox, unread_only, max_results)
        })
        .await;

        match result {
            Ok(Ok(messages)) => {
                debug!(label, count = messages.len(), "Fetched emails");
                messages
            }
            Ok(Err(e)) => {
                error!(label, error = %e, "Email fetch failed");
                Vec::new()
            }
            Err(e) => {
                error!(label, "Email fetch task panicked: {e}");
                Vec::new()
            }
        }
    }

    async fn mark_as_read(&self, id: &str) -> bool {
        let cfg = self.config.clone();
        let message_id = id.to_string();
        let result =
            tokio::task::spawn_blocking(move || mark_seen_imap(&cfg, &message_id)).await;

        match result {
            Ok(Ok(())) => {
                debug!(id, "Marked email as read");
                true
            }
            Ok(Err(e)) => {
                warn!(id, error = %e, "Failed to mark email as read");
                false
            }
            Err(e) => {
                warn!(id, "Mark-as-read task panicked: {e}");
                false
            }
        }
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Option<String> {
        let cfg = self.config.clone();
        let (to, subject, body) = (to.to_string(), subject.to_string(), body.to_string());
        let result =
            tokio::task::spawn_blocking(move || send_smtp(&cfg, &to, &subject, &body)).await;

        match result {
            Ok(Ok(message_id)) => Some(message_id),
            Ok(Err(e)) => {
                error!(error = %e, "Failed to send email");
                None
            }
            Err(e) => {
                error!("Email send task panicked: {e}");
                None
            }
        }
    }
}

// ── Message ids ─────────────────────────────────────────────────────

/// Build the opaque id for a message: `<mailbox>:<uid>`.
pub fn message_id(mailbox: &str, uid: &str) -> String {
    format!("{mailbox}:{uid}")
}

/// Split an id built by [`message_id`] back into mailbox and UID.
pub fn parse_message_id(id: &str) -> Result<(&str, &str), ChannelError> {
    match id.rsplit_once(':') {
        Some((mailbox, uid))
            if !mailbox.is_empty() && !uid.is_empty() && uid.bytes().all(|b| b.is_ascii_digit()) =>
        {
            Ok((mailbox, uid))
        }
        _ => Err(ChannelError::InvalidMessageId(id.to_string())),
    }
}

// ── IMAP session ────────────────────────────────────────────────────

/// Untagged lines and literals collected for one tagged command.
#[derive(Debug, Default)]
pub(crate) struct ImapResponse {
    pub lines: Vec<String>,
    pub literals: Vec<Vec<u8>>,
}

/// Raw message data from a `UID FETCH`.
#[derive(Debug)]
pub(crate) struct FetchedRaw {
    pub seen: bool,
    pub raw: Vec<u8>,
}

/// Minimal IMAP4rev1 client over any byte stream.
pub(crate) struct ImapSession<S> {
    stream: S,
    tag: u32,
}

impl<S: Read + Write> ImapSession<S> {
    pub fn new(stream: S) -> Self {
        Self { stream, tag: 0 }
    }

    /// Read the server greeting.
    pub fn greeting(&mut self) -> Result<(), ChannelError> {
        let line = self.read_line()?;
        if line.starts_with("* OK") || line.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(ChannelError::ConnectFailed {
                name: CHANNEL.into(),
                reason: format!("unexpected greeting: {}", line.trim_end()),
            })
        }
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<(), ChannelError> {
        let cmd = format!("LOGIN {} {}", quote(username), quote(password));
        self.command(&cmd).map(|_| ()).map_err(|e| match e {
            ChannelError::CommandFailed { reason, .. } => ChannelError::AuthFailed {
                name: CHANNEL.into(),
                reason,
            },
            other => other,
        })
    }

    pub fn select(&mut self, mailbox: &str) -> Result<(), ChannelError> {
        self.command(&format!("SELECT {}", quote(mailbox))).map(|_| ())
    }

    /// UIDs in server order.
    pub fn uid_search(&mut self, unread_only: bool) -> Result<Vec<String>, ChannelError> {
        let criteria = if unread_only { "UNSEEN" } else { "ALL" };
        let response = self.command(&format!("UID SEARCH {criteria}"))?;
        Ok(response
            .lines
            .iter()
            .filter(|line| line.starts_with("* SEARCH"))
            .flat_map(|line| line.split_whitespace().skip(2))
            .map(str::to_string)
            .collect())
    }

    pub fn uid_fetch(&mut self, uid: &str) -> Result<Option<FetchedRaw>, ChannelError> {
        let response = self.command(&format!("UID FETCH {uid} (FLAGS BODY.PEEK[])"))?;
        let seen = response.lines.iter().any(|l| l.contains("\\Seen"));
        Ok(response
            .literals
            .into_iter()
            .next()
            .map(|raw| FetchedRaw { seen, raw }))
    }

    pub fn uid_store_seen(&mut self, uid: &str) -> Result<(), ChannelError> {
        self.command(&format!("UID STORE {uid} +FLAGS (\\Seen)"))
            .map(|_| ())
    }

    pub fn logout(&mut self) {
        if let Err(e) = self.command("LOGOUT") {
            debug!("IMAP logout failed: {e}");
        }
    }

    /// Send a tagged command and collect everything up to its completion.
    pub fn command(&mut self, cmd: &str) -> Result<ImapResponse, ChannelError> {
        self.tag += 1;
        let tag = format!("A{}", self.tag);
        let full = format!("{tag} {cmd}\r\n");
        self.stream.write_all(full.as_bytes())?;
        self.stream.flush()?;

        let prefix = format!("{tag} ");
        let mut response = ImapResponse::default();
        loop {
            let line = self.read_line()?;
            if let Some(size) = literal_size(&line) {
                let literal = self.read_exact_bytes(size)?;
                response.lines.push(line);
                response.literals.push(literal);
                continue;
            }
            if let Some(status) = line.strip_prefix(&prefix) {
                if status.starts_with("OK") {
                    return Ok(response);
                }
                let verb = cmd.split_whitespace().next().unwrap_or(cmd);
                return Err(ChannelError::CommandFailed {
                    name: CHANNEL.into(),
                    reason: format!("{verb}: {}", status.trim_end()),
                });
            }
            response.lines.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, ChannelError> {
        let mut buf = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            match self.stream.read(&mut byte)? {
                0 => {
                    return Err(ChannelError::Disconnected {
                        name: CHANNEL.into(),
                        reason: "IMAP connection closed".into(),
                    });
                }
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).to_string());
                    }
                }
            }
        }
    }

    fn read_exact_bytes(&mut self, size: usize) -> Result<Vec<u8>, ChannelError> {
        let mut buf = vec![0u8; size];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Size of a literal announced at the end of a line (`... {123}\r\n`).
fn literal_size(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches("\r\n");
    let inner = trimmed.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

/// Quote an IMAP string argument.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

// ── IMAP operations (blocking, run in spawn_blocking) ───────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

fn connect_error(reason: impl std::fmt::Display) -> ChannelError {
    ChannelError::ConnectFailed {
        name: CHANNEL.into(),
        reason: reason.to_string(),
    }
}

/// Open a TLS session, read the greeting and log in.
fn open_session(config: &EmailConfig) -> Result<ImapSession<TlsStream>, ChannelError> {
    let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port))
        .map_err(connect_error)?;
    tcp.set_read_timeout(Some(IMAP_READ_TIMEOUT))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = ServerName::try_from(config.imap_host.clone()).map_err(connect_error)?;
    let conn = rustls::ClientConnection::new(tls_config, server_name).map_err(connect_error)?;

    let mut session = ImapSession::new(rustls::StreamOwned::new(conn, tcp));
    session.greeting()?;
    session.login(&config.username, config.password.expose_secret())?;
    Ok(session)
}

fn fetch_imap(
    config: &EmailConfig,
    mailbox: &str,
    unread_only: bool,
    max_results: usize,
) -> Result<Vec<EmailMessage>, ChannelError> {
    let mut session = open_session(config)?;
    let result = fetch_from_session(&mut session, mailbox, unread_only, max_results);
    session.logout();
    result
}

pub(crate) fn fetch_from_session<S: Read + Write>(
    session: &mut ImapSession<S>,
    mailbox: &str,
    unread_only: bool,
    max_results: usize,
) -> Result<Vec<EmailMessage>, ChannelError> {
    session.select(mailbox)?;
    let uids = session.uid_search(unread_only)?;

    let mut messages = Vec::new();
    for uid in uids.iter().take(max_results) {
        let fetched = match session.uid_fetch(uid)? {
            Some(fetched) => fetched,
            None => {
                warn!(uid = %uid, "IMAP fetch returned no body");
                continue;
            }
        };
        match parse_email(&message_id(mailbox, uid), &fetched) {
            Some(message) => messages.push(message),
            None => warn!(uid = %uid, "Failed to parse email"),
        }
    }
    Ok(messages)
}

fn mark_seen_imap(config: &EmailConfig, id: &str) -> Result<(), ChannelError> {
    let (mailbox, uid) = parse_message_id(id)?;
    let mut session = open_session(config)?;
    let result = session
        .select(mailbox)
        .and_then(|()| session.uid_store_seen(uid));
    session.logout();
    result
}

// ── Parsing ─────────────────────────────────────────────────────────

/// Parse a raw RFC 822 message into an [`EmailMessage`].
pub(crate) fn parse_email(id: &str, fetched: &FetchedRaw) -> Option<EmailMessage> {
    let parsed = MessageParser::default().parse(&fetched.raw)?;

    let sender = parsed
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|s| s.to_string())
        .unwrap_or_else(|| "unknown".into());
    let subject = parsed.subject().unwrap_or("No Subject").to_string();
    let body = extract_text(&parsed);
    let received_at = parsed
        .date()
        .and_then(|d| chrono::DateTime::from_timestamp(d.to_timestamp(), 0))
        .unwrap_or_else(chrono::Utc::now);

    Some(EmailMessage {
        id: id.to_string(),
        subject,
        sender,
        body,
        read: fetched.seen,
        received_at,
    })
}

/// Readable body text: the plain part when there is one, otherwise the
/// stripped HTML part (which keeps link targets).
fn extract_text(parsed: &mail_parser::Message) -> String {
    let has_plain_part = parsed
        .text_body
        .first()
        .and_then(|id| parsed.parts.get(*id as usize))
        .is_some_and(|part| {
            part.content_type().is_none_or(|ct| {
                ct.ctype().eq_ignore_ascii_case("text")
                    && !ct.subtype().is_some_and(|s| s.eq_ignore_ascii_case("html"))
            })
        });

    if has_plain_part && let Some(text) = parsed.body_text(0) {
        return text.to_string();
    }
    if let Some(html) = parsed.body_html(0) {
        return strip_html(html.as_ref());
    }
    String::new()
}

// ── SMTP ────────────────────────────────────────────────────────────

fn send_error(reason: impl std::fmt::Display) -> ChannelError {
    ChannelError::SendFailed {
        name: CHANNEL.into(),
        reason: reason.to_string(),
    }
}

/// Send a plain-text email, returning the generated Message-ID.
fn send_smtp(
    config: &EmailConfig,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<String, ChannelError> {
    let domain = config
        .from_address
        .rsplit_once('@')
        .map_or("localhost", |(_, domain)| domain);
    let message_id = format!("<{}@{}>", Uuid::new_v4(), domain);

    let email = Message::builder()
        .from(
            config
                .from_address
                .parse()
                .map_err(|e| send_error(format!("Invalid from address: {e}")))?,
        )
        .to(to
            .parse()
            .map_err(|e| send_error(format!("Invalid to address: {e}")))?)
        .subject(subject)
        .message_id(Some(message_id.clone()))
        .body(body.to_string())
        .map_err(|e| send_error(format!("Failed to build email: {e}")))?;

    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );
    let builder = if config.smtp_port == 465 {
        SmtpTransport::relay(&config.smtp_host)
    } else {
        SmtpTransport::starttls_relay(&config.smtp_host)
    }
    .map_err(|e| send_error(format!("SMTP relay error: {e}")))?;
    let transport = builder.port(config.smtp_port).credentials(creds).build();

    transport
        .send(&email)
        .map_err(|e| send_error(format!("SMTP send failed: {e}")))?;

    info!(to, message_id = %message_id, "Email sent");
    Ok(message_id)
}

// ── Tests ───────────────────────────────────────────────────────────
