//! Scrapelib
//!
//! A polite HTTP fetching client for crawlers and scrapers. Every request
//! goes through a self-imposed rate limit and, optionally, the target host's
//! robots.txt policy before it reaches the network.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`config`] - Scraper settings and validation
//! - [`rate_limiter`] - Fixed-spacing request throttling
//! - [`robots`] - Per-origin robots.txt cache and rule matching
//! - [`transport`] - Pluggable HTTP transport with baseline/extended backends
//! - [`retry`] - Failure classification and fixed-delay retry decisions
//! - [`scraper`] - The [`Scraper`] orchestrator tying everything together
//!
//! # Example
//!
//! ```no_run
//! use scrapelib::{Scraper, ScraperConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ScraperConfig {
//!     requests_per_minute: 30,
//!     follow_robots: true,
//!     ..ScraperConfig::default()
//! };
//! let scraper = Scraper::new(config)?;
//! let response = scraper.get("https://example.com/index.html").await?;
//! println!("{}", response.text());
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
mod error;
pub mod rate_limiter;
pub mod retry;
pub mod robots;
pub mod scraper;
pub mod transport;
mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, ScraperConfig};
pub use error::ScrapeError;
pub use rate_limiter::RateLimiter;
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error, classify_status};
pub use robots::{AllowAll, GoogleRobotsParser, RobotsCache, RobotsParser, Ruleset};
pub use scraper::{FetchOptions, HeaderFn, Scraper};
pub use transport::{Backend, HttpTransport, Response, Transport, TransportError};
pub use user_agent::default_user_agent;
