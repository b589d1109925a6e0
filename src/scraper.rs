//! The [`Scraper`]: throttled, robots-aware fetching with retries.
//!
//! Every fetch runs the same sequence:
//!
//! 1. wait on the [`RateLimiter`];
//! 2. when `follow_robots` is on, ask the [`RobotsCache`] and fail with
//!    [`ScrapeError::RobotExclusion`] if the URL is disallowed;
//! 3. send the request through the [`Transport`];
//! 4. retry transient failures with a fixed pause, up to `retry_attempts`
//!    extra attempts.
//!
//! The throttle wait and robots check happen once per fetch; retries of the
//! same fetch are spaced by the retry wait alone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use tracing::{debug, info, instrument, warn};

use crate::config::{ConfigError, ScraperConfig};
use crate::error::ScrapeError;
use crate::rate_limiter::RateLimiter;
use crate::retry::{FailureType, RetryDecision, RetryPolicy, classify_error, classify_status};
use crate::robots::{RobotsCache, RobotsParser};
use crate::transport::{HttpTransport, Response, Transport, TransportError};

/// Computes extra headers for a URL; see [`Scraper::with_header_fn`].
pub type HeaderFn = dyn Fn(&str) -> HeaderMap + Send + Sync;

/// Per-call request options for [`Scraper::fetch_with`].
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Headers for this call only. They win over every other header source.
    pub headers: HeaderMap,
    /// Treat 404 as transient and retry it. Use only for pages known to exist.
    pub retry_on_404: bool,
}

impl FetchOptions {
    /// Adds a header for this call.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets whether a 404 response is retried.
    #[must_use]
    pub fn retry_on_404(mut self, retry_on_404: bool) -> Self {
        self.retry_on_404 = retry_on_404;
        self
    }
}

/// Polite HTTP client: throttled, robots.txt-aware, retrying.
///
/// A `Scraper` is `Send + Sync`. Share one through `Arc` and every task
/// using it is throttled together; use one per host for independent rates.
///
/// # Example
///
/// ```no_run
/// use scrapelib::{Scraper, ScraperConfig};
///
/// # async fn example() -> Result<(), scrapelib::ScrapeError> {
/// let scraper = Scraper::new(ScraperConfig {
///     requests_per_minute: 30,
///     follow_robots: true,
///     retry_attempts: 2,
///     ..ScraperConfig::default()
/// })?;
///
/// let page = scraper.get("https://example.com/").await?;
/// println!("{}", page.text());
/// # Ok(())
/// # }
/// ```
pub struct Scraper {
    config: ScraperConfig,
    transport: Arc<dyn Transport>,
    rate_limiter: RateLimiter,
    robots: RobotsCache,
    follow_robots: AtomicBool,
    retry_policy: RetryPolicy,
    default_headers: HeaderMap,
    header_fn: Option<Arc<HeaderFn>>,
}

impl fmt::Debug for Scraper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scraper")
            .field("config", &self.config)
            .field("rate_limiter", &self.rate_limiter)
            .field("robots", &self.robots)
            .field("follow_robots", &self.follow_robots())
            .field("retry_policy", &self.retry_policy)
            .field("header_fn", &self.header_fn.is_some())
            .finish_non_exhaustive()
    }
}

impl Scraper {
    /// Creates a scraper with an [`HttpTransport`] built from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Config`] for invalid settings and
    /// [`ScrapeError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: ScraperConfig) -> Result<Self, ScrapeError> {
        config.validate()?;
        let transport = HttpTransport::from_config(&config)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Creates a scraper that sends requests through `transport`.
    ///
    /// The transport is used as given; `config.backend` and the timeout
    /// fields only apply to transports built by [`Scraper::new`].
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeError::Config`] for invalid settings.
    #[instrument(skip_all, fields(requests_per_minute = config.requests_per_minute))]
    pub fn with_transport(
        config: ScraperConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ScrapeError> {
        config.validate()?;

        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|_| ConfigError::InvalidUserAgent(config.user_agent.clone()))?;
        let mut default_headers = HeaderMap::new();
        default_headers.insert(USER_AGENT, user_agent);

        let rate_limiter = RateLimiter::new(config.requests_per_minute);
        rate_limiter.set_throttled(config.throttled);

        let retry_policy = RetryPolicy::new(config.retry_attempts, config.retry_wait()?);

        debug!(
            throttled = config.throttled,
            follow_robots = config.follow_robots,
            retry_attempts = config.retry_attempts,
            "scraper created"
        );

        Ok(Self {
            follow_robots: AtomicBool::new(config.follow_robots),
            config,
            transport,
            rate_limiter,
            robots: RobotsCache::new(),
            retry_policy,
            default_headers,
            header_fn: None,
        })
    }

    /// Replaces the robots.txt parser. Clears any cached robots.txt.
    #[must_use]
    pub fn with_robots_parser(mut self, parser: Arc<dyn RobotsParser>) -> Self {
        self.robots = RobotsCache::with_parser(parser);
        self
    }

    /// Installs a callback computing extra headers for each URL.
    ///
    /// Its headers override the default User-Agent and are overridden by
    /// per-call [`FetchOptions::headers`].
    #[must_use]
    pub fn with_header_fn<F>(mut self, header_fn: F) -> Self
    where
        F: Fn(&str) -> HeaderMap + Send + Sync + 'static,
    {
        self.header_fn = Some(Arc::new(header_fn));
        self
    }

    /// Returns the configuration this scraper was built with.
    ///
    /// `throttled` and `follow_robots` here are the initial values; read the
    /// live ones with [`throttled`](Self::throttled) and
    /// [`follow_robots`](Self::follow_robots).
    #[must_use]
    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Returns the User-Agent sent with requests and checked against robots.txt.
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.config.user_agent
    }

    /// Returns the rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Returns the robots.txt cache.
    #[must_use]
    pub fn robots(&self) -> &RobotsCache {
        &self.robots
    }

    /// Returns whether throttling is currently on.
    #[must_use]
    pub fn throttled(&self) -> bool {
        self.rate_limiter.is_throttled()
    }

    /// Turns throttling on or off for subsequent fetches.
    pub fn set_throttled(&self, throttled: bool) {
        debug!(throttled, "throttling toggled");
        self.rate_limiter.set_throttled(throttled);
    }

    /// Changes the request budget; the next fetch is not delayed.
    pub async fn set_requests_per_minute(&self, requests_per_minute: u32) {
        self.rate_limiter
            .set_requests_per_minute(requests_per_minute)
            .await;
    }

    /// Returns whether robots.txt is currently consulted.
    #[must_use]
    pub fn follow_robots(&self) -> bool {
        self.follow_robots.load(Ordering::SeqCst)
    }

    /// Turns robots.txt checking on or off for subsequent fetches.
    pub fn set_follow_robots(&self, follow_robots: bool) {
        debug!(follow_robots, "robots.txt checking toggled");
        self.follow_robots.store(follow_robots, Ordering::SeqCst);
    }

    /// Fetches `url` with `method` and an optional body.
    ///
    /// # Errors
    ///
    /// See [`fetch_with`](Self::fetch_with).
    pub async fn fetch(
        &self,
        url: &str,
        method: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Response, ScrapeError> {
        self.fetch_with(url, method, body, FetchOptions::default())
            .await
    }

    /// Fetches `url` with per-call options.
    ///
    /// # Errors
    ///
    /// - [`ScrapeError::RobotExclusion`] if robots.txt disallows the URL.
    /// - [`ScrapeError::MethodNotSupported`] if the backend cannot issue `method`.
    /// - [`ScrapeError::HttpStatus`] if the final status is 400 or above and
    ///   `raise_errors` is on.
    /// - [`ScrapeError::RetriesExhausted`] if a network failure outlasted the
    ///   retry budget.
    /// - [`ScrapeError::Transport`] for other permanent transport failures.
    #[instrument(skip(self, body, options), fields(method = %method))]
    pub async fn fetch_with(
        &self,
        url: &str,
        method: &str,
        body: Option<Vec<u8>>,
        options: FetchOptions,
    ) -> Result<Response, ScrapeError> {
        let method = method.trim().to_ascii_uppercase();
        info!(method = %method, url, "fetching");

        self.rate_limiter.acquire().await;

        // robots.txt is matched against the agent that will actually be sent.
        let headers = self.request_headers(url, options.headers);
        let user_agent = headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(self.config.user_agent.as_str());

        if self.follow_robots()
            && !self
                .robots
                .is_allowed(url, user_agent, self.transport.as_ref())
                .await
        {
            return Err(ScrapeError::robot_exclusion(url, user_agent));
        }

        let mut attempt = 1;

        loop {
            let outcome = self
                .transport
                .request(&method, url, &headers, body.clone())
                .await;

            let failure = match outcome {
                Ok(response) if accept_response(&response) => return Ok(response),
                Ok(response) => {
                    let failure_type = classify_status(response.status, options.retry_on_404);
                    Failure::Status(response, failure_type)
                }
                Err(error) => {
                    let failure_type = classify_error(&error);
                    Failure::Transport(error, failure_type)
                }
            };

            match self.retry_policy.should_retry(failure.failure_type(), attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %failure,
                        "attempt failed - retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt = next_attempt;
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(attempt, reason = %reason, "not retrying");
                    return self.finish(url, attempt, failure);
                }
            }
        }
    }

    /// Fetches `url` with `GET`.
    ///
    /// # Errors
    ///
    /// See [`fetch_with`](Self::fetch_with).
    pub async fn get(&self, url: &str) -> Result<Response, ScrapeError> {
        self.fetch(url, "GET", None).await
    }

    /// Sends `body` to `url` with `POST`.
    ///
    /// # Errors
    ///
    /// See [`fetch_with`](Self::fetch_with).
    pub async fn post(&self, url: &str, body: impl Into<Vec<u8>>) -> Result<Response, ScrapeError> {
        self.fetch(url, "POST", Some(body.into())).await
    }

    /// Fetches headers for `url` with `HEAD`. Needs the extended backend.
    ///
    /// # Errors
    ///
    /// See [`fetch_with`](Self::fetch_with).
    pub async fn head(&self, url: &str) -> Result<Response, ScrapeError> {
        self.fetch(url, "HEAD", None).await
    }

    /// Fetches `url` with `GET` and saves the body to disk.
    ///
    /// With `filename` the body is written there. Without one it goes to a new
    /// file in the system temp directory, which the caller must delete.
    /// Returns the path written and the response.
    ///
    /// # Errors
    ///
    /// Any [`fetch`](Self::fetch) error, or [`ScrapeError::Io`] if the file
    /// cannot be written.
    pub async fn retrieve(
        &self,
        url: &str,
        filename: Option<&Path>,
    ) -> Result<(PathBuf, Response), ScrapeError> {
        self.retrieve_with(url, filename, "GET", None).await
    }

    /// Like [`retrieve`](Self::retrieve), with an explicit method and body.
    ///
    /// Nothing is written when the fetch fails.
    ///
    /// # Errors
    ///
    /// Any [`fetch`](Self::fetch) error, or [`ScrapeError::Io`] if the file
    /// cannot be written.
    #[instrument(skip(self, filename, body), fields(url = %url))]
    pub async fn retrieve_with(
        &self,
        url: &str,
        filename: Option<&Path>,
        method: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(PathBuf, Response), ScrapeError> {
        let response = self.fetch(url, method, body).await?;

        let path = match filename {
            Some(path) => path.to_path_buf(),
            None => temp_download_path()?,
        };

        tokio::fs::write(&path, &response.body)
            .await
            .map_err(|e| ScrapeError::io(&path, e))?;

        debug!(path = %path.display(), bytes = response.body.len(), "saved response body");
        Ok((path, response))
    }

    /// Merges header sources, later ones winning: User-Agent, header
    /// callback, per-call headers.
    fn request_headers(&self, url: &str, per_call: HeaderMap) -> HeaderMap {
        let mut headers = self.default_headers.clone();
        if let Some(header_fn) = &self.header_fn {
            headers.extend(header_fn(url));
        }
        headers.extend(per_call);
        headers
    }

    fn finish(&self, url: &str, attempts: u32, failure: Failure) -> Result<Response, ScrapeError> {
        match failure {
            Failure::Status(response, _) => {
                if self.config.raise_errors {
                    Err(ScrapeError::http_status(response))
                } else {
                    debug!(status = response.status, "returning unaccepted response");
                    Ok(response)
                }
            }
            Failure::Transport(error, FailureType::Transient) => {
                Err(ScrapeError::retries_exhausted(url, attempts, error))
            }
            Failure::Transport(error, FailureType::Permanent) => Err(error.into()),
        }
    }
}

fn accept_response(response: &Response) -> bool {
    response.status < 400
}

/// Creates an empty, persistent temp file for [`Scraper::retrieve`].
fn temp_download_path() -> Result<PathBuf, ScrapeError> {
    let temp_path = tempfile::Builder::new()
        .prefix("scrapelib-")
        .tempfile()
        .map_err(|e| ScrapeError::io(std::env::temp_dir(), e))?
        .into_temp_path();
    temp_path
        .keep()
        .map_err(|e| ScrapeError::io(std::env::temp_dir(), e.error))
}

/// One failed attempt.
enum Failure {
    Status(Response, FailureType),
    Transport(TransportError, FailureType),
}

impl Failure {
    fn failure_type(&self) -> FailureType {
        match self {
            Self::Status(_, failure_type) | Self::Transport(_, failure_type) => *failure_type,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(response, _) => write!(f, "HTTP {}", response.status),
            Self::Transport(error, _) => write!(f, "{error}"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::robots::Ruleset;
    use crate::transport::Backend;

    /// Records requests and answers from a script; `/robots.txt` is served
    /// separately so robots checks never consume scripted responses.
    #[derive(Default)]
    struct ScriptedTransport {
        robots_txt: Option<String>,
        script: Mutex<VecDeque<Result<Response, TransportError>>>,
        calls: Mutex<Vec<(String, String, HeaderMap)>>,
        bodies: Mutex<Vec<Option<Vec<u8>>>>,
    }

    impl ScriptedTransport {
        fn with_script(script: Vec<Result<Response, TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            }
        }

        fn page_calls(&self) -> Vec<(String, String, HeaderMap)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, url, _)| !url.ends_with("/robots.txt"))
                .cloned()
                .collect()
        }

        fn robots_calls(&self) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, url, _)| url.ends_with("/robots.txt"))
                .count()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn request(
            &self,
            method: &str,
            url: &str,
            headers: &HeaderMap,
            body: Option<Vec<u8>>,
        ) -> Result<Response, TransportError> {
            if !url.ends_with("/robots.txt") {
                self.bodies.lock().unwrap().push(body);
            }
            self.calls
                .lock()
                .unwrap()
                .push((method.to_string(), url.to_string(), headers.clone()));

            if url.ends_with("/robots.txt") {
                return Ok(match &self.robots_txt {
                    Some(body) => response(url, 200, body),
                    None => response(url, 404, ""),
                });
            }

            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(response(url, 200, "ok")))
        }
    }

    fn response(url: &str, status: u16, body: &str) -> Response {
        Response {
            requested_url: url.to_string(),
            final_url: url.to_string(),
            status,
            headers: HeaderMap::new(),
            body: body.as_bytes().to_vec(),
        }
    }

    fn config() -> ScraperConfig {
        ScraperConfig {
            requests_per_minute: 0,
            user_agent: "testbot/1.0".to_string(),
            retry_wait_seconds: 0.0,
            ..ScraperConfig::default()
        }
    }

    fn scraper(config: ScraperConfig, transport: &Arc<ScriptedTransport>) -> Scraper {
        let transport: Arc<dyn Transport> = Arc::clone(transport) as Arc<dyn Transport>;
        Scraper::with_transport(config, transport).unwrap()
    }

    const URL: &str = "http://a.test/page.html";

    // ==================== Construction ====================

    #[test]
    fn test_invalid_config_rejected() {
        let result = Scraper::new(ScraperConfig {
            retry_wait_seconds: -1.0,
            ..ScraperConfig::default()
        });
        assert!(matches!(
            result,
            Err(ScrapeError::Config(ConfigError::InvalidRetryWait(_)))
        ));
    }

    #[test]
    fn test_runtime_toggles_start_from_config() {
        let transport = Arc::new(ScriptedTransport::default());
        let scraper = scraper(
            ScraperConfig {
                throttled: false,
                follow_robots: true,
                ..config()
            },
            &transport,
        );
        assert!(!scraper.throttled());
        assert!(scraper.follow_robots());

        scraper.set_throttled(true);
        scraper.set_follow_robots(false);
        assert!(scraper.throttled());
        assert!(!scraper.follow_robots());
    }

    // ==================== Headers ====================

    #[tokio::test]
    async fn test_header_precedence() {
        let transport = Arc::new(ScriptedTransport::default());
        let scraper = scraper(config(), &transport).with_header_fn(|url| {
            let mut headers = HeaderMap::new();
            headers.insert("x-url", HeaderValue::from_str(url).unwrap());
            headers.insert("x-source", HeaderValue::from_static("callback"));
            headers
        });

        let options = FetchOptions::default()
            .header(HeaderName::from_static("x-source"), HeaderValue::from_static("call"));
        scraper.fetch_with(URL, "get", None, options).await.unwrap();

        let calls = transport.page_calls();
        let (method, _, headers) = &calls[0];
        assert_eq!(method, "GET");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "testbot/1.0");
        assert_eq!(headers.get("x-url").unwrap(), URL);
        assert_eq!(headers.get("x-source").unwrap(), "call");
    }

    #[tokio::test]
    async fn test_header_fn_can_override_user_agent() {
        let transport = Arc::new(ScriptedTransport::default());
        let scraper = scraper(config(), &transport).with_header_fn(|_| {
            let mut headers = HeaderMap::new();
            headers.insert(USER_AGENT, HeaderValue::from_static("other/2.0"));
            headers
        });

        scraper.get(URL).await.unwrap();
        let calls = transport.page_calls();
        assert_eq!(calls[0].2.get(USER_AGENT).unwrap(), "other/2.0");
    }

    // ==================== Robots ====================

    #[tokio::test]
    async fn test_robot_exclusion_never_reaches_transport() {
        let transport = Arc::new(ScriptedTransport {
            robots_txt: Some("User-agent: *\nDisallow: /private/\n".to_string()),
            ..ScriptedTransport::default()
        });
        let scraper = scraper(
            ScraperConfig {
                follow_robots: true,
                retry_attempts: 3,
                ..config()
            },
            &transport,
        );

        let result = scraper.get("http://a.test/private/secret.html").await;
        match result {
            Err(ScrapeError::RobotExclusion { url, user_agent }) => {
                assert_eq!(url, "http://a.test/private/secret.html");
                assert_eq!(user_agent, "testbot/1.0");
            }
            other => panic!("Expected RobotExclusion, got: {other:?}"),
        }
        assert!(transport.page_calls().is_empty());

        scraper.set_follow_robots(false);
        scraper.get("http://a.test/private/secret.html").await.unwrap();
        assert_eq!(transport.page_calls().len(), 1);
        assert_eq!(transport.robots_calls(), 1);
    }

    fn badbot_robots() -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport {
            robots_txt: Some("User-agent: badbot\nDisallow: /\n".to_string()),
            ..ScriptedTransport::default()
        })
    }

    #[tokio::test]
    async fn test_robots_checks_per_call_user_agent() {
        let transport = badbot_robots();
        let scraper = scraper(
            ScraperConfig {
                follow_robots: true,
                ..config()
            },
            &transport,
        );

        let options =
            FetchOptions::default().header(USER_AGENT, HeaderValue::from_static("badbot/1.0"));
        let result = scraper.fetch_with(URL, "GET", None, options).await;
        match result {
            Err(ScrapeError::RobotExclusion { user_agent, .. }) => {
                assert_eq!(user_agent, "badbot/1.0");
            }
            other => panic!("Expected RobotExclusion, got: {other:?}"),
        }
        assert!(transport.page_calls().is_empty());

        // The configured agent is not named in robots.txt.
        scraper.get(URL).await.unwrap();
        assert_eq!(transport.page_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_robots_checks_header_fn_user_agent() {
        let transport = badbot_robots();
        let scraper = scraper(
            ScraperConfig {
                follow_robots: true,
                ..config()
            },
            &transport,
        )
        .with_header_fn(|_| {
            let mut headers = HeaderMap::new();
            headers.insert(USER_AGENT, HeaderValue::from_static("badbot/1.0"));
            headers
        });

        let result = scraper.get(URL).await;
        assert!(
            matches!(result, Err(ScrapeError::RobotExclusion { ref user_agent, .. }) if user_agent == "badbot/1.0"),
            "Expected RobotExclusion, got: {result:?}"
        );
        assert!(transport.page_calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_robots_parser() {
        #[derive(Debug)]
        struct DenyAll;
        impl Ruleset for DenyAll {
            fn is_allowed(&self, _url: &str, _user_agent: &str) -> bool {
                false
            }
        }
        struct DenyParser;
        impl RobotsParser for DenyParser {
            fn parse(&self, _content: &str) -> Arc<dyn Ruleset> {
                Arc::new(DenyAll)
            }
        }

        let transport = Arc::new(ScriptedTransport {
            robots_txt: Some("# anything".to_string()),
            ..ScriptedTransport::default()
        });
        let scraper = scraper(
            ScraperConfig {
                follow_robots: true,
                ..config()
            },
            &transport,
        )
        .with_robots_parser(Arc::new(DenyParser));

        assert!(matches!(
            scraper.get(URL).await,
            Err(ScrapeError::RobotExclusion { .. })
        ));
    }

    // ==================== Retries ====================

    #[tokio::test]
    async fn test_transient_error_retried_then_succeeds() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Err(TransportError::timeout(URL)),
            Ok(response(URL, 503, "busy")),
            Ok(response(URL, 200, "finally")),
        ]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 2,
                ..config()
            },
            &transport,
        );

        let page = scraper.get(URL).await.unwrap();
        assert_eq!(page.text(), "finally");
        assert_eq!(transport.page_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_wraps_last_error() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Err(TransportError::timeout(URL)),
            Err(TransportError::timeout(URL)),
            Err(TransportError::timeout(URL)),
        ]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 2,
                ..config()
            },
            &transport,
        );

        match scraper.get(URL).await {
            Err(ScrapeError::RetriesExhausted {
                attempts, source, ..
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(source, TransportError::Timeout { .. }));
            }
            other => panic!("Expected RetriesExhausted, got: {other:?}"),
        }
        assert_eq!(transport.page_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_retry_wait_is_fixed() {
        tokio::time::pause();

        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Err(TransportError::timeout(URL)),
            Err(TransportError::timeout(URL)),
            Err(TransportError::timeout(URL)),
        ]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 2,
                retry_wait_seconds: 5.0,
                ..config()
            },
            &transport,
        );

        let start = Instant::now();
        let _ = scraper.get(URL).await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Err(
            TransportError::invalid_url("bad"),
        )]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 5,
                ..config()
            },
            &transport,
        );

        assert!(matches!(
            scraper.get(URL).await,
            Err(ScrapeError::Transport(TransportError::InvalidUrl { .. }))
        ));
        assert_eq!(transport.page_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_method_not_supported_not_retried() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Err(
            TransportError::method_not_supported("HEAD", Backend::Baseline),
        )]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 5,
                ..config()
            },
            &transport,
        );

        assert!(matches!(
            scraper.head(URL).await,
            Err(ScrapeError::MethodNotSupported { .. })
        ));
        assert_eq!(transport.page_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_404_not_retried_by_default() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(response(URL, 404, "missing")),
            Ok(response(URL, 200, "found")),
        ]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 3,
                ..config()
            },
            &transport,
        );

        let error = scraper.get(URL).await.unwrap_err();
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.response().unwrap().text(), "missing");
        assert_eq!(transport.page_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_retry_on_404() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(response(URL, 404, "missing")),
            Ok(response(URL, 200, "found")),
        ]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 3,
                ..config()
            },
            &transport,
        );

        let options = FetchOptions::default().retry_on_404(true);
        let page = scraper.fetch_with(URL, "GET", None, options).await.unwrap();
        assert_eq!(page.text(), "found");
        assert_eq!(transport.page_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_raise_errors_false_returns_final_response() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![
            Ok(response(URL, 500, "first")),
            Ok(response(URL, 500, "second")),
        ]));
        let scraper = scraper(
            ScraperConfig {
                retry_attempts: 1,
                raise_errors: false,
                ..config()
            },
            &transport,
        );

        let page = scraper.get(URL).await.unwrap();
        assert_eq!(page.status, 500);
        assert_eq!(page.text(), "second");
    }

    #[tokio::test]
    async fn test_redirect_status_accepted() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(response(
            URL, 304, "",
        ))]));
        let scraper = scraper(config(), &transport);
        assert_eq!(scraper.get(URL).await.unwrap().status, 304);
    }

    // ==================== Throttling ====================

    #[tokio::test]
    async fn test_fetches_are_spaced_when_throttled() {
        tokio::time::pause();

        let transport = Arc::new(ScriptedTransport::default());
        let scraper = scraper(
            ScraperConfig {
                requests_per_minute: 30,
                ..config()
            },
            &transport,
        );

        let start = Instant::now();
        for _ in 0..3 {
            scraper.get(URL).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_secs(4));

        scraper.set_throttled(false);
        let start = Instant::now();
        for _ in 0..3 {
            scraper.get(URL).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    // ==================== retrieve ====================

    #[tokio::test]
    async fn test_retrieve_to_named_file() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(response(
            URL,
            200,
            "saved body",
        ))]));
        let scraper = scraper(config(), &transport);
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("page.html");

        let (path, page) = scraper.retrieve(URL, Some(&target)).await.unwrap();
        assert_eq!(path, target);
        assert_eq!(page.status, 200);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "saved body");
    }

    #[tokio::test]
    async fn test_retrieve_to_temp_file() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(response(
            URL, 200, "temp body",
        ))]));
        let scraper = scraper(config(), &transport);

        let (path, _) = scraper.retrieve(URL, None).await.unwrap();
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "temp body");
        std::fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_retrieve_error_writes_nothing() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(response(
            URL, 500, "",
        ))]));
        let scraper = scraper(config(), &transport);
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("page.html");

        assert!(scraper.retrieve(URL, Some(&target)).await.is_err());
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_retrieve_with_post_body() {
        let transport = Arc::new(ScriptedTransport::with_script(vec![Ok(response(
            URL, 200, "posted",
        ))]));
        let scraper = scraper(config(), &transport);
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("result.html");

        let (path, page) = scraper
            .retrieve_with(URL, Some(&target), "post", Some(b"q=rust".to_vec()))
            .await
            .unwrap();
        assert_eq!(page.status, 200);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "posted");

        let calls = transport.page_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "POST");
        assert_eq!(
            transport.bodies.lock().unwrap().as_slice(),
            &[Some(b"q=rust".to_vec())]
        );
    }
}
