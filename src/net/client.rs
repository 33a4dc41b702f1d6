//! Shared HTTP transport.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, ClientBuilder};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

pub const USER_AGENT: &str = concat!("rota-client/", env!("CARGO_PKG_VERSION"));

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Applies to the whole exchange, refresh calls included. There is no other
/// deadline on a request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Transport shared by every client a factory creates, and by the refresh
/// coordinator.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: Client,
}

impl HttpClient {
    /// Transport with the default user agent and timeouts.
    pub fn new() -> Self {
        Self::builder().build().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP transport, using reqwest defaults");
            Self::from_reqwest(Client::default())
        })
    }

    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Transport configured from the `[client]` section.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.connect_timeout())
            .request_timeout(config.request_timeout())
            .build()
    }

    /// Wrap an existing reqwest client, e.g. one with a custom TLS setup.
    pub fn from_reqwest(inner: Client) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpClientBuilder {
    user_agent: String,
    connect_timeout: Duration,
    request_timeout: Duration,
    headers: Vec<(String, String)>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
            headers: Vec::new(),
        }
    }
}

impl HttpClientBuilder {
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = ua.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Header sent with every request. `Authorization` is managed per
    /// request and overrides any value set here.
    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> Result<HttpClient> {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| Error::InvalidHeader(format!("invalid header name: {name}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| Error::InvalidHeader(format!("invalid value for header {name}")))?;
            headers.insert(name, value);
        }

        let inner = ClientBuilder::new()
            .user_agent(self.user_agent)
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .default_headers(headers)
            .build()
            .map_err(Error::Network)?;

        Ok(HttpClient { inner })
    }
}
