//! reqwest-backed [`Transport`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, Method};
use tracing::{debug, instrument};
use url::Url;

use super::{Backend, Response, Transport, TransportError};
use crate::config::{DEFAULT_CONNECT_TIMEOUT, ScraperConfig};
use crate::user_agent;

/// HTTP transport over a pooled reqwest client.
///
/// Create one per [`Scraper`](crate::Scraper) and reuse it; the underlying
/// client keeps connections alive between requests.
///
/// # Example
///
/// ```no_run
/// use reqwest::header::HeaderMap;
/// use scrapelib::{Backend, HttpTransport, Transport};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = HttpTransport::new(Backend::Extended)?;
/// let response = transport
///     .request("HEAD", "https://example.com/", &HeaderMap::new(), None)
///     .await?;
/// println!("status: {}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    backend: Backend,
}

impl HttpTransport {
    /// Creates a transport with the default connect timeout and no overall
    /// request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the HTTP client cannot be built
    /// (for example when the TLS backend fails to initialize).
    pub fn new(backend: Backend) -> Result<Self, TransportError> {
        Self::with_timeouts(backend, DEFAULT_CONNECT_TIMEOUT, None)
    }

    /// Creates a transport from the backend, timeouts and compression
    /// setting in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the HTTP client cannot be built.
    pub fn from_config(config: &ScraperConfig) -> Result<Self, TransportError> {
        let builder = base_client_builder(config.connect_timeout(), config.timeout())
            .gzip(!config.disable_compression);
        Self::build(config.backend, builder)
    }

    /// Creates a transport with explicit timeout values.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the HTTP client cannot be built.
    pub fn with_timeouts(
        backend: Backend,
        connect_timeout: Duration,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        Self::build(backend, base_client_builder(connect_timeout, timeout))
    }

    #[instrument(level = "debug", skip_all, fields(backend = %backend))]
    fn build(backend: Backend, builder: ClientBuilder) -> Result<Self, TransportError> {
        let client = builder
            .build()
            .map_err(|source| TransportError::Build { source })?;
        debug!("built HTTP transport");
        Ok(Self { client, backend })
    }

    /// Returns the backend this transport runs with.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, headers, body), fields(backend = %self.backend))]
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response, TransportError> {
        let method = parse_method(method)?;
        if !self.backend.supports(&method) {
            return Err(TransportError::method_not_supported(
                method.as_str(),
                self.backend,
            ));
        }

        let parsed_url = Url::parse(url).map_err(|_| TransportError::invalid_url(url))?;

        let mut request = self
            .client
            .request(method, parsed_url)
            .headers(headers.clone());
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::from_send(url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let response_headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::request(url, e))?
            .to_vec();

        debug!(status, bytes = body.len(), "response received");

        Ok(Response {
            requested_url: url.to_string(),
            final_url,
            status,
            headers: response_headers,
            body,
        })
    }
}

/// Parses a method string case-insensitively into a reqwest [`Method`].
fn parse_method(method: &str) -> Result<Method, TransportError> {
    let upper = method.trim().to_ascii_uppercase();
    if upper.is_empty() {
        return Err(TransportError::invalid_method(method));
    }
    Method::from_bytes(upper.as_bytes()).map_err(|_| TransportError::invalid_method(method))
}

fn base_client_builder(connect_timeout: Duration, timeout: Option<Duration>) -> ClientBuilder {
    let mut builder = Client::builder()
        .connect_timeout(connect_timeout)
        .gzip(true)
        .user_agent(user_agent::default_user_agent());
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
}
