use async_trait::async_trait;
use std::time::Duration;
use thirtyfour::prelude::*;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, error};

use crate::error::CrawlError;

/// Delay after the scroll-to-bottom action so late content can settle
const SCROLL_SETTLE_DELAY: Duration = Duration::from_millis(750);

/// Poll interval while waiting for document.readyState
const READY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Headless rendering of JavaScript-dependent pages
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Navigate to the URL and return the fully rendered HTML
    async fn render(&self, url: &str) -> Result<String, CrawlError>;

    /// Release the underlying browser. Must be called exactly once; further
    /// calls are no-ops.
    async fn close(&self);
}

/// WebDriver-backed renderer. Owns one browser session; renders serialize
/// across workers on the session lock.
pub struct BrowserRenderer {
    driver: Mutex<Option<WebDriver>>,
    render_timeout: Duration,
    wait_ready: bool,
    scroll: bool,
}

impl BrowserRenderer {
    /// Connect to a WebDriver endpoint and open a headless browser session
    pub async fn new(
        webdriver_url: &str,
        user_agent: &str,
        render_timeout: Duration,
        wait_ready: bool,
        scroll: bool,
    ) -> Result<Self, CrawlError> {
        let mut caps = DesiredCapabilities::chrome();
        caps.add_chrome_arg(&format!("--user-agent={}", user_agent))
            .map_err(|e| CrawlError::InvalidConfig(format!("renderer capabilities: {}", e)))?;
        caps.set_headless()
            .map_err(|e| CrawlError::InvalidConfig(format!("renderer capabilities: {}", e)))?;
        caps.add_chrome_arg("--disable-dev-shm-usage")
            .map_err(|e| CrawlError::InvalidConfig(format!("renderer capabilities: {}", e)))?;

        let driver = WebDriver::new(webdriver_url, caps).await.map_err(|e| {
            CrawlError::InvalidConfig(format!(
                "failed to connect to WebDriver at {}: {}",
                webdriver_url, e
            ))
        })?;

        driver
            .set_page_load_timeout(render_timeout)
            .await
            .map_err(|e| CrawlError::InvalidConfig(format!("renderer timeout: {}", e)))?;

        debug!("Browser renderer connected to {}", webdriver_url);

        Ok(Self {
            driver: Mutex::new(Some(driver)),
            render_timeout,
            wait_ready,
            scroll,
        })
    }

    async fn render_inner(&self, driver: &WebDriver, url: &str) -> Result<String, CrawlError> {
        let render_err = |e: WebDriverError| CrawlError::Render {
            url: url.to_string(),
            message: e.to_string(),
        };

        driver.goto(url).await.map_err(render_err)?;

        if self.wait_ready {
            loop {
                let state = driver
                    .execute("return document.readyState", Vec::new())
                    .await
                    .map_err(render_err)?;
                let state: String = state.json().as_str().unwrap_or_default().to_string();
                if state == "complete" {
                    break;
                }
                sleep(READY_POLL_INTERVAL).await;
            }
        }

        if self.scroll {
            driver
                .execute(
                    "window.scrollTo(0, document.body.scrollHeight)",
                    Vec::new(),
                )
                .await
                .map_err(render_err)?;
            sleep(SCROLL_SETTLE_DELAY).await;
        }

        driver.source().await.map_err(render_err)
    }
}

#[async_trait]
impl PageRenderer for BrowserRenderer {
    async fn render(&self, url: &str) -> Result<String, CrawlError> {
        let guard = self.driver.lock().await;
        let driver = guard.as_ref().ok_or_else(|| CrawlError::Render {
            url: url.to_string(),
            message: "renderer is closed".to_string(),
        })?;

        debug!("Rendering: {}", url);
        match timeout(self.render_timeout, self.render_inner(driver, url)).await {
            Ok(result) => result,
            Err(_) => Err(CrawlError::Render {
                url: url.to_string(),
                message: format!("render timed out after {:?}", self.render_timeout),
            }),
        }
    }

    async fn close(&self) {
        if let Some(driver) = self.driver.lock().await.take() {
            if let Err(e) = driver.quit().await {
                error!("Error closing browser renderer: {}", e);
            }
            debug!("Browser renderer closed");
        }
    }
}

impl Drop for BrowserRenderer {
    fn drop(&mut self) {
        // Fallback release if close() was never awaited; quitting needs the
        // runtime, so hand it off
        if let Ok(mut guard) = self.driver.try_lock() {
            if let Some(driver) = guard.take() {
                tokio::spawn(async move {
                    if let Err(e) = driver.quit().await {
                        error!("Error closing browser renderer during drop: {}", e);
                    }
                });
            }
        }
    }
}
