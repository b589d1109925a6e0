//! Pluggable HTTP transport for scraper requests.
//!
//! A [`Transport`] issues exactly one request and normalizes the outcome into
//! a [`Response`] or a [`TransportError`]. It never retries, throttles or
//! consults robots.txt; those concerns belong to the [`Scraper`](crate::Scraper).
//!
//! [`HttpTransport`] is the reqwest-backed implementation. It runs with one of
//! two [`Backend`] profiles that differ only in which HTTP methods they
//! accept:
//!
//! | Backend | Methods |
//! |---------|---------|
//! | [`Backend::Baseline`] | `GET`, `POST` |
//! | [`Backend::Extended`] | any valid method token (`HEAD`, `PUT`, ...) |
//!
//! Asking a backend for a method outside its profile fails with
//! [`TransportError::MethodNotSupported`] instead of silently switching.

mod client;
mod error;
mod response;

pub use client::HttpTransport;
pub use error::TransportError;
pub use response::Response;

use std::fmt;

use async_trait::async_trait;
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// Capability to issue a single HTTP request.
///
/// Implementations must return `Ok` for every HTTP status code the server
/// answers with; deciding whether a status is acceptable is left to the
/// caller.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one request and collects the full response body.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when the request cannot be built, the
    /// method is outside the transport's capability set, or the network
    /// exchange fails.
    async fn request(
        &self,
        method: &str,
        url: &str,
        headers: &HeaderMap,
        body: Option<Vec<u8>>,
    ) -> Result<Response, TransportError>;
}

/// Selects which method-support profile a [`HttpTransport`] runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Supports `GET` and `POST` only.
    Baseline,
    /// Supports arbitrary methods, including `HEAD`.
    #[default]
    Extended,
}

impl Backend {
    /// Returns whether this backend can issue `method`.
    #[must_use]
    pub fn supports(self, method: &Method) -> bool {
        match self {
            Self::Baseline => *method == Method::GET || *method == Method::POST,
            Self::Extended => true,
        }
    }

    /// Returns the stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::Extended => "extended",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_supports_get_and_post_only() {
        assert!(Backend::Baseline.supports(&Method::GET));
        assert!(Backend::Baseline.supports(&Method::POST));
        assert!(!Backend::Baseline.supports(&Method::HEAD));
        assert!(!Backend::Baseline.supports(&Method::PUT));
        assert!(!Backend::Baseline.supports(&Method::DELETE));
    }

    #[test]
    fn test_extended_supports_everything() {
        assert!(Backend::Extended.supports(&Method::GET));
        assert!(Backend::Extended.supports(&Method::HEAD));
        assert!(Backend::Extended.supports(&Method::OPTIONS));
        let custom = Method::from_bytes(b"PURGE").unwrap();
        assert!(Backend::Extended.supports(&custom));
    }

    #[test]
    fn test_default_backend_is_extended() {
        assert_eq!(Backend::default(), Backend::Extended);
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::Baseline.to_string(), "baseline");
        assert_eq!(Backend::Extended.to_string(), "extended");
    }
}
