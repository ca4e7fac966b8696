//! Form actor port: follow the giveaway link in a message and submit the
//! entry form on the linked page.

pub mod browser;

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::channels::EmailMessage;
use crate::error::BrowserError;

pub use browser::{ChromeDriver, build_form_actor};

/// Name typed into the first text input of an entry form.
pub const PARTICIPANT_NAME: &str = "Participant";

const EMAIL_INPUT_SELECTOR: &str = r#"input[type="email"]"#;
const TEXT_INPUT_SELECTOR: &str = r#"input[type="text"]"#;
const SUBMIT_SELECTOR: &str = r#"button[type="submit"], input[type="submit"]"#;

static URL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:[a-zA-Z]|[0-9]|[$-_@.&+]|[!*\(\),]|(?:%[0-9a-fA-F][0-9a-fA-F]))+")
        .expect("URL pattern is valid")
});

/// First URL-shaped substring of `text`; first match wins.
pub fn extract_first_url(text: &str) -> Option<&str> {
    URL_PATTERN.find(text).map(|m| m.as_str())
}

/// Narrow capability interface toward the browser.
#[async_trait]
pub trait FormActor: Send + Sync {
    /// Attempt to enter the giveaway linked from `message`.
    ///
    /// `true` iff the linked page was reached; form steps are best-effort.
    async fn participate(&self, message: &EmailMessage) -> bool;

    /// Release the browser session. Idempotent.
    async fn close(&self);
}

/// Stand-in used when the browser is disabled or failed to launch.
#[derive(Debug, Default, Clone, Copy)]
pub struct InertFormActor;

#[async_trait]
impl FormActor for InertFormActor {
    async fn participate(&self, message: &EmailMessage) -> bool {
        debug!(id = %message.id, "No browser session, participation skipped");
        false
    }

    async fn close(&self) {}
}

/// Low-level page operations a [`WebFormActor`] is built from.
#[async_trait]
pub trait PageDriver: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Type `value` into the first element matching `selector`.
    /// `Ok(false)` when nothing matches.
    async fn fill_first(&mut self, selector: &str, value: &str) -> Result<bool, BrowserError>;

    /// Click the first element matching `selector`. `Ok(false)` when nothing matches.
    async fn click_first(&mut self, selector: &str) -> Result<bool, BrowserError>;

    async fn release(&mut self) -> Result<(), BrowserError>;
}

/// Form actor driving a single page session.
///
/// The session sits behind an async mutex so only one participation drives
/// the page at a time. After [`FormActor::close`] the slot is empty and
/// every call answers `false`.
pub struct WebFormActor<D: PageDriver> {
    driver: Mutex<Option<D>>,
}

impl<D: PageDriver> WebFormActor<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver: Mutex::new(Some(driver)),
        }
    }

    pub async fn is_open(&self) -> bool {
        self.driver.lock().await.is_some()
    }
}

#[async_trait]
impl<D: PageDriver + 'static> FormActor for WebFormActor<D> {
    async fn participate(&self, message: &EmailMessage) -> bool {
        let Some(url) = extract_first_url(&message.body) else {
            info!(id = %message.id, "No URL found in message body");
            return false;
        };

        let mut slot = self.driver.lock().await;
        let Some(driver) = slot.as_mut() else {
            warn!(id = %message.id, "Browser session already closed");
            return false;
        };

        if let Err(e) = driver.navigate(url).await {
            warn!(id = %message.id, url, error = %e, "Navigation failed");
            return false;
        }
        info!(id = %message.id, url, "Opened giveaway page");

        let email_step = driver.fill_first(EMAIL_INPUT_SELECTOR, &message.sender).await;
        log_step(&message.id, "email input", email_step);

        let name_step = driver.fill_first(TEXT_INPUT_SELECTOR, PARTICIPANT_NAME).await;
        log_step(&message.id, "text input", name_step);

        let submit_step = driver.click_first(SUBMIT_SELECTOR).await;
        log_step(&message.id, "submit button", submit_step);

        true
    }

    async fn close(&self) {
        let Some(mut driver) = self.driver.lock().await.take() else {
            return;
        };
        match driver.release().await {
            Ok(()) => info!("Browser session closed"),
            Err(e) => warn!(error = %e, "Browser session did not close cleanly"),
        }
    }
}

fn log_step(id: &str, step: &str, result: Result<bool, BrowserError>) {
    match result {
        Ok(true) => debug!(id, step, "Form step done"),
        Ok(false) => debug!(id, step, "Form element not present"),
        Err(e) => warn!(id, step, error = %e, "Form step failed"),
    }
}
