//! Chromium-backed page driver.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig as ChromeConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::automation::{FormActor, InertFormActor, PageDriver, WebFormActor};
use crate::config::BrowserConfig;
use crate::error::BrowserError;

const CHROME_ARGS: [&str; 2] = ["--no-sandbox", "--disable-dev-shm-usage"];

/// One browser process with a single reusable tab.
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    settle: Duration,
}

impl ChromeDriver {
    /// Launch the browser and open a blank tab.
    pub async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let mut builder = ChromeConfig::builder()
            .args(CHROME_ARGS)
            .request_timeout(Duration::from_secs(config.request_timeout_secs));
        builder = if config.headless {
            builder.new_headless_mode()
        } else {
            builder.with_head()
        };
        if let Some(executable) = &config.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let chrome_config = builder.build().map_err(BrowserError::LaunchFailed)?;

        let (browser, mut handler) = Browser::launch(chrome_config)
            .await
            .map_err(|e| BrowserError::LaunchFailed(e.to_string()))?;

        // CDP events must be polled for the browser to make progress.
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser event handler stopped");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                handler.abort();
                return Err(BrowserError::LaunchFailed(format!("new tab: {e}")));
            }
        };

        Ok(Self {
            browser,
            page,
            handler,
            settle: Duration::from_millis(config.settle_ms),
        })
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| BrowserError::NavigationFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        tokio::time::sleep(self.settle).await;
        Ok(())
    }

    async fn fill_first(&mut self, selector: &str, value: &str) -> Result<bool, BrowserError> {
        let interaction = |e: chromiumoxide::error::CdpError| BrowserError::Interaction {
            selector: selector.to_string(),
            reason: e.to_string(),
        };
        let elements = self.page.find_elements(selector).await.map_err(interaction)?;
        let Some(element) = elements.first() else {
            return Ok(false);
        };
        element.click().await.map_err(interaction)?;
        element.type_str(value).await.map_err(interaction)?;
        Ok(true)
    }

    async fn click_first(&mut self, selector: &str) -> Result<bool, BrowserError> {
        let interaction = |e: chromiumoxide::error::CdpError| BrowserError::Interaction {
            selector: selector.to_string(),
            reason: e.to_string(),
        };
        let elements = self.page.find_elements(selector).await.map_err(interaction)?;
        let Some(element) = elements.first() else {
            return Ok(false);
        };
        element.click().await.map_err(interaction)?;
        Ok(true)
    }

    async fn release(&mut self) -> Result<(), BrowserError> {
        let closed = self.browser.close().await;
        if let Err(e) = self.browser.wait().await {
            warn!(error = %e, "Waiting for browser exit failed");
        }
        self.handler.abort();
        closed
            .map(|_| ())
            .map_err(|e| BrowserError::ShutdownFailed(e.to_string()))
    }
}

/// Build the configured form actor, falling back to [`InertFormActor`] when
/// the browser is disabled or cannot be launched.
pub async fn build_form_actor(config: &BrowserConfig) -> Arc<dyn FormActor> {
    if !config.enabled {
        warn!("Browser disabled in configuration, giveaways will not be entered");
        return Arc::new(InertFormActor);
    }

    match ChromeDriver::launch(config).await {
        Ok(driver) => {
            info!(headless = config.headless, "Browser session started");
            Arc::new(WebFormActor::new(driver))
        }
        Err(e) => {
            error!(error = %e, "Browser unavailable, giveaways will not be entered");
            Arc::new(InertFormActor)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::EmailMessage;

    #[tokio::test]
    async fn disabled_browser_builds_inert_actor() {
        let config = BrowserConfig {
            enabled: false,
            ..BrowserConfig::default()
        };
        let actor = build_form_actor(&config).await;
        let message = EmailMessage::new("INBOX:1", "s", "a@b.c", "https://example.com");
        assert!(!actor.participate(&message).await);
        actor.close().await;
    }

    #[tokio::test]
    async fn missing_executable_falls_back_to_inert() {
        let config = BrowserConfig {
            chrome_executable: Some("/nonexistent/chromium".into()),
            headless: true,
            ..BrowserConfig::default()
        };
        let actor = build_form_actor(&config).await;
        let message = EmailMessage::new("INBOX:1", "s", "a@b.c", "https://example.com");
        assert!(!actor.participate(&message).await);
    }
}
