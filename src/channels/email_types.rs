//! Email-specific types: the fetched message and body text helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message fetched from the mail source.
///
/// Immutable for the duration of a cycle. `read` reflects the server-side
/// flag at fetch time; only the source changes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    /// Opaque identifier, unique per source.
    pub id: String,
    pub subject: String,
    /// Sender address.
    pub sender: String,
    /// Decoded body text.
    pub body: String,
    pub read: bool,
    pub received_at: DateTime<Utc>,
}

impl EmailMessage {
    pub fn new(
        id: impl Into<String>,
        subject: impl Into<String>,
        sender: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            sender: sender.into(),
            body: body.into(),
            read: false,
            received_at: Utc::now(),
        }
    }

    /// Text handed to the classifier: subject, newline, body.
    pub fn classification_text(&self) -> String {
        format!("{}\n{}", self.subject, self.body)
    }
}

/// Strip HTML tags from content (basic).
///
/// Link targets are kept next to their text so URLs in HTML-only bodies
/// survive.
pub fn strip_html(html: &str) -> String {
    let mut result = String::new();
    let mut tag = String::new();
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => {
                in_tag = true;
                tag.clear();
            }
            '>' if in_tag => {
                in_tag = false;
                result.push(' ');
                if let Some(href) = extract_href(&tag) {
                    result.push_str(href);
                    result.push(' ');
                }
            }
            _ if in_tag => tag.push(ch),
            _ => result.push(ch),
        }
    }
    result.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `href` value of an anchor tag body such as `a href="https://x"`.
fn extract_href(tag: &str) -> Option<&str> {
    let lower = tag.to_ascii_lowercase();
    if !lower.starts_with("a ") {
        return None;
    }
    let start = lower.find("href=")? + 5;
    let rest = tag.get(start..)?;
    let (quote, rest) = match rest.chars().next()? {
        q @ ('"' | '\'') => (q, rest.get(1..)?),
        _ => (' ', rest),
    };
    let end = rest.find(quote).unwrap_or(rest.len());
    let href = rest.get(..end)?.trim();
    (!href.is_empty()).then_some(href)
}
