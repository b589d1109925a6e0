//! Error types returned by [`Scraper`](crate::Scraper) operations.
//!
//! Each failure mode gets its own variant so callers can tell a policy
//! refusal (robots.txt) from a network failure from a bad configuration.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::transport::{Backend, Response, TransportError};

/// Errors that can occur while scraping.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The configuration was rejected when the scraper was built.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// robots.txt disallows the URL for this user agent. Never retried.
    #[error("user agent '{user_agent}' not allowed at '{url}'")]
    RobotExclusion {
        /// The disallowed URL.
        url: String,
        /// The user agent that was checked.
        user_agent: String,
    },

    /// The configured backend cannot issue the requested method. Never retried.
    #[error("{backend} backend does not support HTTP method {method}")]
    MethodNotSupported {
        /// The requested method, uppercased.
        method: String,
        /// The backend that rejected it.
        backend: Backend,
    },

    /// The final response had a status of 400 or above.
    #[error("{status} while retrieving {url}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The full response, for callers that want to inspect it.
        response: Box<Response>,
    },

    /// Transient failures persisted through every allowed attempt.
    #[error("giving up on {url} after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        /// The requested URL.
        url: String,
        /// Attempts made, first attempt included.
        attempts: u32,
        /// The failure from the last attempt.
        #[source]
        source: TransportError,
    },

    /// A permanent transport failure, such as a malformed URL.
    #[error(transparent)]
    Transport(TransportError),

    /// Writing a retrieved body to disk failed.
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl ScrapeError {
    /// Creates a robots exclusion error.
    pub fn robot_exclusion(url: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self::RobotExclusion {
            url: url.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Creates an HTTP status error carrying the response.
    pub fn http_status(response: Response) -> Self {
        Self::HttpStatus {
            url: response.requested_url.clone(),
            status: response.status,
            response: Box::new(response),
        }
    }

    /// Creates a retries-exhausted error.
    pub fn retries_exhausted(url: impl Into<String>, attempts: u32, source: TransportError) -> Self {
        Self::RetriesExhausted {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns the response attached to an [`HttpStatus`](Self::HttpStatus) error.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::HttpStatus { response, .. } => Some(response.as_ref()),
            _ => None,
        }
    }

    /// Returns the HTTP status of an [`HttpStatus`](Self::HttpStatus) error.
    ///
    /// Status failures always carry their response, so this is `Some` exactly
    /// when [`response`](Self::response) is.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.response().map(|response| response.status)
    }
}

impl From<TransportError> for ScrapeError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::MethodNotSupported { method, backend } => {
                Self::MethodNotSupported { method, backend }
            }
            other => Self::Transport(other),
        }
    }
}
