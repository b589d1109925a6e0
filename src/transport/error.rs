//! Error types for the transport layer.

use thiserror::Error;

use super::Backend;

/// Errors raised while issuing a single HTTP request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The URL could not be parsed or uses a scheme the transport cannot reach.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The method string is not a valid HTTP method token.
    #[error("invalid HTTP method: {method:?}")]
    InvalidMethod {
        /// The rejected method string.
        method: String,
    },

    /// The selected backend cannot issue this method.
    #[error("{backend} backend does not support HTTP method {method}")]
    MethodNotSupported {
        /// The requested method, uppercased.
        method: String,
        /// The backend that rejected it.
        backend: Backend,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Connection could not be established (DNS, refused, reset).
    #[error("connection error requesting {url}: {source}")]
    Connect {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Any other failure while sending the request or reading the body.
    #[error("request error for {url}: {source}")]
    Request {
        /// The URL that failed.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client itself could not be constructed.
    #[error("failed to build HTTP client: {source}")]
    Build {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },
}

impl TransportError {
    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid method error.
    pub fn invalid_method(method: impl Into<String>) -> Self {
        Self::InvalidMethod {
            method: method.into(),
        }
    }

    /// Creates a method-not-supported error.
    pub fn method_not_supported(method: impl Into<String>, backend: Backend) -> Self {
        Self::MethodNotSupported {
            method: method.into(),
            backend,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a connection error.
    pub fn connect(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Connect {
            url: url.into(),
            source,
        }
    }

    /// Creates a generic request error.
    pub fn request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Request {
            url: url.into(),
            source,
        }
    }

    /// Classifies a reqwest send failure for `url`.
    pub(crate) fn from_send(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else if source.is_connect() {
            Self::connect(url, source)
        } else if source.is_builder() {
            Self::invalid_url(url)
        } else {
            Self::request(url, source)
        }
    }
}
