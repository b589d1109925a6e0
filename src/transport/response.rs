use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use reqwest::header::{CONTENT_TYPE, HeaderMap};

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// The URL the caller asked for.
    pub requested_url: String,
    /// The URL that produced this response, after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl Response {
    /// Returns the body decoded with [`encoding`](Self::encoding).
    ///
    /// Malformed sequences become U+FFFD. A byte order mark overrides the
    /// declared charset.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        let (text, _, _) = self.encoding().decode(&self.body);
        text
    }

    /// Returns the encoding named by the Content-Type `charset` parameter.
    ///
    /// Falls back to UTF-8 when the header is missing or the label is unknown.
    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.header(CONTENT_TYPE.as_str())
            .and_then(charset_label)
            .and_then(|label| Encoding::for_label(label.as_bytes()))
            .unwrap_or(UTF_8)
    }

    /// Returns whether the status is in the 2xx range.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns a header value as a string, if present and valid ASCII.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

fn charset_label(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"'))
    })
}
