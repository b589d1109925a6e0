//! Default User-Agent string sent with scraper and robots.txt requests.

/// Project URL for User-Agent identification (good citizenship; RFC 9308).
const PROJECT_UA_URL: &str = "https://docs.rs/scrapelib";

/// Default User-Agent for scraper traffic.
///
/// The leading `scrapelib` product token is what robots.txt groups are
/// matched against, so site owners can address this client by name.
#[must_use]
pub fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("scrapelib/{version} (+{PROJECT_UA_URL})")
}
