//! Browser fetch backend for JavaScript-rendered sites
//!
//! Drives a Chromium instance over CDP. The browser launches lazily on the
//! first fetch and stays up for the rest of the site's crawl, so cookies
//! and login state persist the same way the HTTP backend's jar does. CDP
//! does not surface HTTP status codes, so a page that renders counts as a
//! 200 and login rejection shows up as missing form elements rather than a
//! status.

use crate::config::Config;
use crate::fetch::{Fetcher, LoginForm, ProxyEndpoint, RawPage, SessionHandle};
use crate::FetchError;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use chrono::Utc;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

/// Fetches pages by rendering them in Chromium
///
/// Proxy routing is fixed when the browser launches, so only the endpoint
/// handed to the first fetch applies. Per-request proxy rotation needs
/// HTTP mode.
pub struct BrowserFetcher {
    user_agent: String,
    headless: bool,
    load_images: bool,
    window_width: u32,
    window_height: u32,
    wait_after_load: Duration,
    browser: Mutex<Option<Browser>>,
}

impl BrowserFetcher {
    pub fn new(config: &Config) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            headless: config.browser.headless,
            load_images: config.browser.load_images,
            window_width: config.browser.window_width,
            window_height: config.browser.window_height,
            wait_after_load: Duration::from_secs(config.browser.wait_after_load),
            browser: Mutex::new(None),
        }
    }

    async fn launch(&self, proxy: Option<&ProxyEndpoint>) -> Result<Browser, FetchError> {
        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!(
                "--window-size={},{}",
                self.window_width, self.window_height
            ));

        // with_head means NOT headless
        if !self.headless {
            builder = builder.with_head();
        }

        if !self.load_images {
            builder = builder.arg("--blink-settings=imagesEnabled=false");
        }

        if let Some(endpoint) = proxy {
            builder = builder.arg(format!("--proxy-server={}", endpoint.url));
        }

        let config = builder.build().map_err(FetchError::Client)?;

        info!(headless = self.headless, "launching browser");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Client(e.to_string()))?;

        // Drive CDP messages until the browser goes away
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(browser)
    }

    /// Opens a page on the shared browser, launching it on first use
    async fn open_page(
        &self,
        url: &Url,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<Page, FetchError> {
        let mut guard = self.browser.lock().await;
        let browser = match &mut *guard {
            Some(browser) => browser,
            slot => slot.insert(self.launch(proxy).await?),
        };

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| cdp_error(url.as_str(), e))?;

        // Override the UA before any navigation happens
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(|e| cdp_error(url.as_str(), e))?;

        page.goto(url.as_str())
            .await
            .map_err(|e| cdp_error(url.as_str(), e))?;

        let _ = page.wait_for_navigation().await;
        tokio::time::sleep(self.wait_after_load).await;

        Ok(page)
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(
        &self,
        url: &Url,
        session: Option<&SessionHandle>,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawPage, FetchError> {
        debug!(%url, authenticated = session.is_some(), "rendering page");

        let page = self.open_page(url, proxy).await?;
        let body = page
            .content()
            .await
            .map_err(|e| cdp_error(url.as_str(), e))?;
        let _ = page.close().await;

        Ok(RawPage {
            url: url.clone(),
            status: 200,
            body,
            fetched_at: Utc::now(),
        })
    }

    async fn submit_form(
        &self,
        url: &Url,
        form: &LoginForm,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawPage, FetchError> {
        debug!(%url, "filling form");

        let page = self.open_page(url, proxy).await?;

        for (name, value) in &form.fields {
            let selector = format!("input[name='{}']", name);
            let field = page
                .find_element(&selector)
                .await
                .map_err(|e| cdp_error(url.as_str(), e))?;
            field
                .click()
                .await
                .map_err(|e| cdp_error(url.as_str(), e))?;
            field
                .type_str(value)
                .await
                .map_err(|e| cdp_error(url.as_str(), e))?;
        }

        let submit = page
            .find_element(&form.submit_selector)
            .await
            .map_err(|e| cdp_error(url.as_str(), e))?;
        submit
            .click()
            .await
            .map_err(|e| cdp_error(url.as_str(), e))?;

        let _ = page.wait_for_navigation().await;
        tokio::time::sleep(self.wait_after_load).await;

        let body = page
            .content()
            .await
            .map_err(|e| cdp_error(url.as_str(), e))?;
        let _ = page.close().await;

        Ok(RawPage {
            url: url.clone(),
            status: 200,
            body,
            fetched_at: Utc::now(),
        })
    }
}

/// Maps a CDP error onto the fetch error taxonomy
fn cdp_error(url: &str, error: CdpError) -> FetchError {
    match error {
        CdpError::Timeout => FetchError::Timeout {
            url: url.to_string(),
        },
        other => FetchError::Network {
            url: url.to_string(),
            message: other.to_string(),
        },
    }
}
