//! HTTP message data model.
//!
//! # Responsibilities
//! - Hold the parsed request/status line and headers of one message
//! - Keep the body bytes seen by the last parse call
//! - Carry the body state between parse calls (continuations)
//!
//! # Design Decisions
//! - Header lookup is case-insensitive; duplicates are kept, first match wins
//! - Header count is bounded by [`MAX_HEADERS`]; extra headers are dropped
//! - `Request` and `Response` are scratch objects owned by one worker and
//!   overwritten on every fresh parse

use super::body::BodyState;

/// Maximum number of headers kept per message.
pub const MAX_HEADERS: usize = 128;

/// A single header field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// Ordered, capacity-bounded header list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<Header>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header. Returns `false` once [`MAX_HEADERS`] is reached.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push(Header {
            key: key.into(),
            value: value.into(),
        });
        true
    }

    /// Value of the first header whose key matches `key`, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.value.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= MAX_HEADERS
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Content metadata derived from the header section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentInfo {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    /// Body is human readable (textual media type, no content coding).
    pub is_text: bool,
}

impl ContentInfo {
    pub(crate) fn from_headers(headers: &Headers) -> Self {
        let content_type = headers.get("Content-Type").map(str::to_string);
        let content_encoding = headers
            .get("Content-Encoding")
            .map(str::to_string)
            .filter(|v| !v.eq_ignore_ascii_case("identity"));

        let is_text = content_encoding.is_none()
            && content_type.as_deref().map(is_text_media_type).unwrap_or(false);

        Self {
            content_type,
            content_encoding,
            is_text,
        }
    }
}

fn is_text_media_type(value: &str) -> bool {
    let essence = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    essence.starts_with("text/")
        || essence.ends_with("+json")
        || essence.ends_with("+xml")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/x-www-form-urlencoded"
        )
}

/// A parsed HTTP request.
#[derive(Debug, Default)]
pub struct Request {
    pub method: String,
    /// Normalized target: origin-form path, `*` for OPTIONS, or the authority
    /// for CONNECT. Never the raw absolute-form URI.
    pub uri: String,
    pub version: String,
    pub headers: Headers,
    /// Request line plus header block, including the terminating blank line.
    pub header_size: usize,
    /// Body bytes delivered by the last parse call.
    pub body: Vec<u8>,
    pub body_size: usize,
    pub content: ContentInfo,
    pub(crate) body_state: BodyState,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// A chunked body is still being decoded across parse calls.
    pub fn is_chunked(&self) -> bool {
        self.body_state.is_chunked()
    }

    /// The next parse call continues the body instead of starting a new message.
    pub fn is_continuation(&self) -> bool {
        !self.body_state.is_complete()
    }

    pub fn is_connect(&self) -> bool {
        self.method.eq_ignore_ascii_case("CONNECT")
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.get("Host")
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}

/// A parsed HTTP response.
#[derive(Debug, Default)]
pub struct Response {
    pub version: String,
    pub status_code: u16,
    pub reason_phrase: String,
    pub headers: Headers,
    pub header_size: usize,
    pub body: Vec<u8>,
    pub body_size: usize,
    pub content: ContentInfo,
    pub(crate) body_state: BodyState,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_chunked(&self) -> bool {
        self.body_state.is_chunked()
    }

    pub fn is_continuation(&self) -> bool {
        !self.body_state.is_complete()
    }

    /// 1xx, 204 and 304 never carry a body.
    pub fn status_forbids_body(&self) -> bool {
        (100..200).contains(&self.status_code) || self.status_code == 204 || self.status_code == 304
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }
}
