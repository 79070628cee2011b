//! Fetch backends
//!
//! The crawl core is generic over how a page's HTML is obtained. The HTTP
//! backend does a plain GET of the page source; the browser backend drives
//! a Chromium instance for JavaScript-rendered pages. The backend is picked
//! per site when configuration is loaded and hidden behind the [`Fetcher`]
//! trait, so the crawl logic never branches on mode.

mod http;

#[cfg(feature = "browser")]
mod browser;

pub use http::HttpFetcher;

#[cfg(feature = "browser")]
pub use browser::BrowserFetcher;

use crate::config::{Config, ScrapeMode};
use crate::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use url::Url;

/// One endpoint of the proxy pool
#[derive(Debug, Clone)]
pub struct ProxyEndpoint {
    /// Position in the configured pool, used for failure accounting
    pub index: usize,

    /// Parsed endpoint URL
    pub url: Url,
}

/// One fetched page, before extraction
#[derive(Debug, Clone)]
pub struct RawPage {
    /// Final URL after redirects
    pub url: Url,

    /// HTTP status of the final response
    pub status: u16,

    /// Page source
    pub body: String,

    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,
}

/// Proof that a site's login flow completed against a fetch backend
///
/// The session state itself (cookies, browser profile) lives inside the
/// backend that produced the handle; the handle only records that
/// authentication happened for a site.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    site: String,
}

impl SessionHandle {
    pub(crate) fn new(site: impl Into<String>) -> Self {
        Self { site: site.into() }
    }

    pub fn site(&self) -> &str {
        &self.site
    }
}

/// A prepared login submission
#[derive(Debug, Clone)]
pub struct LoginForm {
    /// Form field name/value pairs, credentials included
    pub fields: Vec<(String, String)>,

    /// CSS selector of the submit control, browser mode only
    pub submit_selector: String,
}

/// A fetch backend
///
/// One instance serves one site and is shared by that site's crawl task.
/// Fetches within a site happen sequentially, so implementations do not
/// need request pipelining, but they must be `Send + Sync` to live inside
/// the spawned task.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches one page
    ///
    /// Non-success statuses are errors; the caller decides whether to
    /// retry. `proxy` routes the request through a pool endpoint and
    /// `session` marks it as part of an authenticated crawl.
    async fn fetch(
        &self,
        url: &Url,
        session: Option<&SessionHandle>,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawPage, FetchError>;

    /// Submits a login form and returns the resulting page
    ///
    /// Unlike [`Fetcher::fetch`], a rejection status still comes back as a
    /// page. Login flows classify the response themselves; only transport
    /// failures are errors here.
    async fn submit_form(
        &self,
        url: &Url,
        form: &LoginForm,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawPage, FetchError>;
}

impl std::fmt::Debug for dyn Fetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Fetcher")
    }
}

/// Builds the fetch backend a target's mode calls for
pub fn build_fetcher(mode: ScrapeMode, config: &Config) -> Result<Arc<dyn Fetcher>, FetchError> {
    match mode {
        ScrapeMode::Http => Ok(Arc::new(HttpFetcher::new(config)?)),
        ScrapeMode::Browser => browser_fetcher(config),
    }
}

#[cfg(feature = "browser")]
fn browser_fetcher(config: &Config) -> Result<Arc<dyn Fetcher>, FetchError> {
    Ok(Arc::new(BrowserFetcher::new(config)))
}

#[cfg(not(feature = "browser"))]
fn browser_fetcher(_config: &Config) -> Result<Arc<dyn Fetcher>, FetchError> {
    Err(FetchError::Unsupported(
        "browser mode requires the `browser` feature".to_string(),
    ))
}
