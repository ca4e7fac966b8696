//! Mail source port and its IMAP/SMTP adapter.

pub mod email;
pub mod email_types;

use async_trait::async_trait;

pub use email::ImapEmailSource;
pub use email_types::EmailMessage;

/// Narrow capability interface toward the mail service.
///
/// Implementations never surface errors to the caller: failures are logged
/// inside the adapter and reported as empty / `false` / `None`.
#[async_trait]
pub trait EmailSource: Send + Sync {
    /// Fetch up to `max_results` messages from `label`, in the order the
    /// service lists them. Empty on any retrieval failure.
    async fn fetch(&self, label: &str, unread_only: bool, max_results: usize) -> Vec<EmailMessage>;

    /// Mark a message as read. Idempotent; `false` on failure.
    async fn mark_as_read(&self, id: &str) -> bool;

    /// Send a plain-text email. Returns the message id, or `None` on failure.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Option<String>;
}
