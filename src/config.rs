//! Scraper configuration and validation.
//!
//! [`ScraperConfig`] is a plain settings struct. It can be built in code with
//! struct-update syntax or deserialized from any serde format (missing fields
//! take their defaults). It is validated once, when a
//! [`Scraper`](crate::Scraper) is constructed.
//!
//! # Example
//!
//! ```
//! use scrapelib::{Backend, ScraperConfig};
//!
//! let config = ScraperConfig {
//!     requests_per_minute: 0,
//!     follow_robots: true,
//!     backend: Backend::Baseline,
//!     ..ScraperConfig::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

use reqwest::header::HeaderValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::transport::Backend;
use crate::user_agent::default_user_agent;

/// Default requests per minute when throttling is enabled.
pub const DEFAULT_REQUESTS_PER_MINUTE: u32 = 60;

/// Default pause between retry attempts, in seconds.
pub const DEFAULT_RETRY_WAIT_SECONDS: f64 = 5.0;

/// Default HTTP connect timeout, in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS);

/// Largest accepted timeout value, in seconds.
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Settings for a [`Scraper`](crate::Scraper).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Maximum sustained request rate. `0` disables throttling.
    pub requests_per_minute: u32,
    /// Whether throttling is applied at all. Can be toggled on a live scraper.
    pub throttled: bool,
    /// Whether robots.txt is consulted before each request. Can be toggled on
    /// a live scraper.
    pub follow_robots: bool,
    /// User-Agent header sent with every request and matched against robots.txt.
    pub user_agent: String,
    /// Number of retries after the first attempt for transient failures.
    pub retry_attempts: u32,
    /// Fixed pause between attempts, in seconds.
    pub retry_wait_seconds: f64,
    /// Transport backend profile.
    pub backend: Backend,
    /// Return an error for responses with status >= 400. When false such
    /// responses are returned as-is once retries are exhausted.
    pub raise_errors: bool,
    /// Overall per-request timeout in seconds. `None` waits indefinitely.
    pub timeout_secs: Option<u64>,
    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Stop advertising gzip and return bodies exactly as the server sent them.
    pub disable_compression: bool,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: DEFAULT_REQUESTS_PER_MINUTE,
            throttled: true,
            follow_robots: false,
            user_agent: default_user_agent(),
            retry_attempts: 0,
            retry_wait_seconds: DEFAULT_RETRY_WAIT_SECONDS,
            backend: Backend::default(),
            raise_errors: true,
            timeout_secs: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            disable_compression: false,
        }
    }
}

impl ScraperConfig {
    /// Validates config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] naming the first invalid field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.retry_wait()?;

        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::EmptyUserAgent);
        }
        if HeaderValue::from_str(&self.user_agent).is_err() {
            return Err(ConfigError::InvalidUserAgent(self.user_agent.clone()));
        }

        validate_timeout_secs("connect_timeout_secs", Some(self.connect_timeout_secs))?;
        validate_timeout_secs("timeout_secs", self.timeout_secs)?;

        Ok(())
    }

    /// Returns the retry pause as a [`Duration`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidRetryWait`] for negative or non-finite values.
    pub fn retry_wait(&self) -> Result<Duration, ConfigError> {
        Duration::try_from_secs_f64(self.retry_wait_seconds)
            .map_err(|_| ConfigError::InvalidRetryWait(self.retry_wait_seconds))
    }

    /// Returns the connect timeout as a [`Duration`].
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Returns the overall request timeout, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn validate_timeout_secs(field: &'static str, value: Option<u64>) -> Result<(), ConfigError> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=MAX_TIMEOUT_SECS).contains(&value) {
        return Err(ConfigError::InvalidTimeout { field, value });
    }
    Ok(())
}

/// Invalid scraper configuration, detected at construction time.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// `retry_wait_seconds` is negative, NaN or infinite.
    #[error("retry_wait_seconds must be a finite, non-negative number, got {0}")]
    InvalidRetryWait(f64),

    /// `user_agent` is empty or whitespace.
    #[error("user_agent cannot be empty")]
    EmptyUserAgent,

    /// `user_agent` contains characters not allowed in an HTTP header.
    #[error("user_agent is not a valid header value: {0:?}")]
    InvalidUserAgent(String),

    /// A timeout is outside the accepted range.
    #[error("{field} must be within 1..=3600 seconds, got {value}")]
    InvalidTimeout {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: u64,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ScraperConfig::default();
        assert_eq!(config.requests_per_minute, 60);
        assert!(config.throttled);
        assert!(!config.follow_robots);
        assert_eq!(config.retry_attempts, 0);
        assert!((config.retry_wait_seconds - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.backend, Backend::Extended);
        assert!(config.raise_errors);
        assert!(!config.disable_compression);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.connect_timeout(), Duration::from_secs(30));
        assert!(config.user_agent.starts_with("scrapelib/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_negative_retry_wait_rejected() {
        let config = ScraperConfig {
            retry_wait_seconds: -1.0,
            ..ScraperConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::InvalidRetryWait(-1.0)));
    }

    #[test]
    fn test_non_finite_retry_wait_rejected() {
        let config = ScraperConfig {
            retry_wait_seconds: f64::INFINITY,
            ..ScraperConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRetryWait(_))
        ));
    }

    #[test]
    fn test_fractional_retry_wait_converts() {
        let config = ScraperConfig {
            retry_wait_seconds: 0.25,
            ..ScraperConfig::default()
        };
        assert_eq!(config.retry_wait().unwrap(), Duration::from_millis(250));
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        let config = ScraperConfig {
            user_agent: "   ".to_string(),
            ..ScraperConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyUserAgent));
    }

    #[test]
    fn test_user_agent_with_newline_rejected() {
        let config = ScraperConfig {
            user_agent: "bot\r\nX-Evil: 1".to_string(),
            ..ScraperConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUserAgent(_))
        ));
    }

    #[test]
    fn test_timeout_range_enforced() {
        let config = ScraperConfig {
            timeout_secs: Some(0),
            ..ScraperConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidTimeout {
                field: "timeout_secs",
                value: 0
            })
        );

        let config = ScraperConfig {
            connect_timeout_secs: 3601,
            ..ScraperConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimeout {
                field: "connect_timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_deserialize_partial_config_uses_defaults() {
        let config: ScraperConfig = serde_json::from_str(
            r#"{"requests_per_minute": 30, "follow_robots": true, "backend": "baseline"}"#,
        )
        .unwrap();
        assert_eq!(config.requests_per_minute, 30);
        assert!(config.follow_robots);
        assert_eq!(config.backend, Backend::Baseline);
        assert!(config.throttled);
        assert_eq!(config.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS);
    }

    #[test]
    fn test_deserialize_negative_rate_rejected() {
        let result: Result<ScraperConfig, _> =
            serde_json::from_str(r#"{"requests_per_minute": -5}"#);
        assert!(result.is_err());
    }
}
