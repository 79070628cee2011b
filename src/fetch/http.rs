//! Plain HTTP fetch backend

use crate::config::Config;
use crate::fetch::{Fetcher, LoginForm, ProxyEndpoint, RawPage, SessionHandle};
use crate::FetchError;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::cookie::Jar;
use reqwest::{Client, ClientBuilder, Proxy, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

/// Fetches pages with plain HTTP requests
///
/// One instance serves one site. Cookies persist across every request the
/// instance makes, login submissions included, so authenticated fetches
/// keep their session. Requests through different proxy endpoints share
/// the cookie jar but use separate clients, built lazily per endpoint.
pub struct HttpFetcher {
    user_agent: String,
    timeout: Duration,
    jar: Arc<Jar>,
    clients: Mutex<HashMap<String, Client>>,
}

impl HttpFetcher {
    /// Creates a fetcher and eagerly builds its direct (proxyless) client
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let user_agent = config.user_agent.clone();
        let timeout = Duration::from_secs(config.request_timeout);
        let jar = Arc::new(Jar::default());

        let direct = base_builder(&user_agent, timeout, &jar)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        let mut clients = HashMap::new();
        clients.insert(String::new(), direct);

        Ok(Self {
            user_agent,
            timeout,
            jar,
            clients: Mutex::new(clients),
        })
    }

    /// Returns the client for a proxy endpoint, building it on first use
    async fn client_for(&self, proxy: Option<&ProxyEndpoint>) -> Result<Client, FetchError> {
        let key = proxy.map(|p| p.url.as_str().to_string()).unwrap_or_default();

        let mut clients = self.clients.lock().await;
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        let mut builder = base_builder(&self.user_agent, self.timeout, &self.jar);
        if let Some(endpoint) = proxy {
            let routed =
                Proxy::all(endpoint.url.as_str()).map_err(|e| FetchError::Client(e.to_string()))?;
            builder = builder.proxy(routed);
        }

        let client = builder
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        clients.insert(key, client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &Url,
        session: Option<&SessionHandle>,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawPage, FetchError> {
        let client = self.client_for(proxy).await?;

        debug!(%url, authenticated = session.is_some(), "fetching page");

        let response = client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| classify_error(url.as_str(), &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        read_page(response).await
    }

    async fn submit_form(
        &self,
        url: &Url,
        form: &LoginForm,
        proxy: Option<&ProxyEndpoint>,
    ) -> Result<RawPage, FetchError> {
        let client = self.client_for(proxy).await?;

        debug!(%url, "submitting form");

        let response = client
            .post(url.clone())
            .form(&form.fields)
            .send()
            .await
            .map_err(|e| classify_error(url.as_str(), &e))?;

        // A rejection status is still a page here; the login flow
        // classifies the response itself
        read_page(response).await
    }
}

fn base_builder(user_agent: &str, timeout: Duration, jar: &Arc<Jar>) -> ClientBuilder {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .cookie_provider(Arc::clone(jar))
        .gzip(true)
        .brotli(true)
}

/// Drains a response into a [`RawPage`]
async fn read_page(response: Response) -> Result<RawPage, FetchError> {
    let status = response.status().as_u16();
    let final_url = response.url().clone();

    let body = response
        .text()
        .await
        .map_err(|e| classify_error(final_url.as_str(), &e))?;

    Ok(RawPage {
        url: final_url,
        status,
        body,
        fetched_at: Utc::now(),
    })
}

/// Maps a transport error onto the fetch error taxonomy
fn classify_error(url: &str, error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else if error.is_builder() {
        FetchError::Client(error.to_string())
    } else {
        FetchError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
