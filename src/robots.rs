//! robots.txt fetching and per-origin caching for polite crawling.
//!
//! [`RobotsCache`] answers "may this agent fetch this URL". The first query
//! for an origin downloads `<origin>/robots.txt` through the scraper's
//! [`Transport`] and hands the body to a [`RobotsParser`]. The parsed
//! [`Ruleset`] is kept for the lifetime of the cache.
//!
//! A robots.txt that cannot be fetched or read never blocks scraping: the
//! origin is cached with an allow-all ruleset instead.

use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use dashmap::DashMap;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use robotstxt::DefaultMatcher;
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::transport::Transport;

/// Exclusion rules parsed from one robots.txt document.
pub trait Ruleset: Send + Sync + fmt::Debug {
    /// Returns whether `user_agent` may fetch `url`.
    fn is_allowed(&self, url: &str, user_agent: &str) -> bool;
}

/// Turns robots.txt content into a [`Ruleset`].
pub trait RobotsParser: Send + Sync {
    /// Parses a robots.txt body. Must not fail: malformed lines are ignored.
    fn parse(&self, content: &str) -> Arc<dyn Ruleset>;
}

/// Ruleset that permits everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Ruleset for AllowAll {
    fn is_allowed(&self, _url: &str, _user_agent: &str) -> bool {
        true
    }
}

/// Returns the permissive fallback ruleset.
#[must_use]
pub fn allow_all() -> Arc<dyn Ruleset> {
    Arc::new(AllowAll)
}

/// Default parser, backed by the `robotstxt` port of Google's matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct GoogleRobotsParser;

impl RobotsParser for GoogleRobotsParser {
    fn parse(&self, content: &str) -> Arc<dyn Ruleset> {
        if content.trim().is_empty() {
            return allow_all();
        }
        Arc::new(GoogleRuleset {
            content: content.to_string(),
        })
    }
}

/// robots.txt body evaluated with [`DefaultMatcher`] on each query.
#[derive(Debug, Clone)]
struct GoogleRuleset {
    content: String,
}

impl Ruleset for GoogleRuleset {
    fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, product_token(user_agent), url)
    }
}

/// Reduces a User-Agent header to the product token robots.txt groups match on.
///
/// `"scrapelib/0.1 (+https://...)"` becomes `"scrapelib"`.
#[must_use]
pub fn product_token(user_agent: &str) -> &str {
    let first = user_agent.split_whitespace().next().unwrap_or_default();
    let token = first.split('/').next().unwrap_or_default();
    if token.is_empty() { "*" } else { token }
}

/// Builds the origin string (scheme + host + port) from a URL for robots.txt lookup.
///
/// Returns `None` for unparseable URLs and for schemes other than `http` and
/// `https`, which have no robots.txt.
#[must_use]
pub fn origin_for_robots(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return None;
    }
    let host = parsed.host_str()?;
    let origin = match parsed.port() {
        Some(port) => format!("{scheme}://{host}:{port}"),
        None => format!("{scheme}://{host}"),
    };
    Some(origin)
}

/// Cached robots.txt outcome for one origin.
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// Rules to evaluate; allow-all when the fetch failed.
    pub rules: Arc<dyn Ruleset>,
    /// When robots.txt was requested.
    pub fetched_at: SystemTime,
    /// Whether the fetch failed and the permissive fallback is in use.
    pub fetch_failed: bool,
}

/// Per-origin robots.txt cache.
///
/// Entries are created lazily and never expire. Each origin holds a
/// [`OnceCell`], so concurrent first queries for the same origin wait on one
/// fetch instead of issuing several.
pub struct RobotsCache {
    entries: DashMap<String, Arc<OnceCell<CachedRobots>>>,
    parser: Arc<dyn RobotsParser>,
}

impl fmt::Debug for RobotsCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RobotsCache")
            .field("origins", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RobotsCache {
    /// Creates an empty cache using [`GoogleRobotsParser`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_parser(Arc::new(GoogleRobotsParser))
    }

    /// Creates an empty cache using a custom parser.
    #[must_use]
    pub fn with_parser(parser: Arc<dyn RobotsParser>) -> Self {
        Self {
            entries: DashMap::new(),
            parser,
        }
    }

    /// Returns the number of origins with a cache slot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether no origin has been queried yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the origins whose robots.txt has been resolved, sorted.
    #[must_use]
    pub fn cached_origins(&self) -> Vec<String> {
        let mut origins: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect();
        origins.sort();
        origins
    }

    /// Returns the cached outcome for `origin`, if resolved.
    #[must_use]
    pub fn get(&self, origin: &str) -> Option<CachedRobots> {
        self.entries
            .get(origin)
            .and_then(|cell| cell.get().cloned())
    }

    /// Returns whether `user_agent` may fetch `url`.
    ///
    /// URLs without an http(s) origin are always allowed. The robots.txt
    /// request goes straight to `transport`; it is neither throttled nor
    /// subject to an exclusion check itself.
    #[instrument(skip(self, transport), fields(url = %url))]
    pub async fn is_allowed(&self, url: &str, user_agent: &str, transport: &dyn Transport) -> bool {
        let Some(origin) = origin_for_robots(url) else {
            debug!("no robots.txt origin for URL - allowing");
            return true;
        };

        // Clone the cell out so the shard lock is released before awaiting.
        let cell = Arc::clone(
            self.entries
                .entry(origin.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .value(),
        );

        if cell.initialized() {
            debug!(origin = %origin, "robots.txt cache hit");
        }

        let cached = cell
            .get_or_init(|| self.fetch(&origin, user_agent, transport))
            .await;

        let allowed = cached.rules.is_allowed(url, user_agent);
        if !allowed {
            debug!(origin = %origin, "robots.txt disallows URL");
        }
        allowed
    }

    async fn fetch(&self, origin: &str, user_agent: &str, transport: &dyn Transport) -> CachedRobots {
        let robots_url = format!("{origin}/robots.txt");
        debug!(robots_url = %robots_url, "fetching robots.txt");
        let fetched_at = SystemTime::now();

        let rules = match fetch_robots_txt(&robots_url, user_agent, transport).await {
            Ok(body) => Some(self.parser.parse(&body)),
            Err(reason) => {
                warn!(robots_url = %robots_url, reason = %reason, "robots.txt unavailable - allowing all");
                None
            }
        };

        CachedRobots {
            fetch_failed: rules.is_none(),
            rules: rules.unwrap_or_else(allow_all),
            fetched_at,
        }
    }
}

async fn fetch_robots_txt(
    robots_url: &str,
    user_agent: &str,
    transport: &dyn Transport,
) -> Result<String, String> {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(user_agent) {
        headers.insert(USER_AGENT, value);
    }

    let response = transport
        .request("GET", robots_url, &headers, None)
        .await
        .map_err(|e| e.to_string())?;

    if !response.is_success() {
        return Err(format!("status {}", response.status));
    }

    String::from_utf8(response.body).map_err(|_| "body is not valid UTF-8".to_string())
}
