//! HTTP/1.1 message parser.
//!
//! # Responsibilities
//! - Locate the header block (`\r\n\r\n`) in a single read buffer
//! - Parse the request or status line and the header section
//! - Normalize the request target
//! - Determine body framing (chunked, Content-Length, none) and consume the
//!   body bytes present in the buffer
//!
//! # Design Decisions
//! - One buffer, one message: a header block split across reads is malformed
//! - Transfer-Encoding: chunked takes precedence over Content-Length
//! - A message whose body is unfinished is continued by the next call, which
//!   skips header parsing entirely

use memchr::memchr;
use thiserror::Error;

use super::body::BodyState;
use super::chunked::ChunkedDecoder;
use super::cursor::{header_block_len, Cursor};
use super::message::{ContentInfo, Headers, Request, Response};

/// Errors produced while parsing a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A required delimiter or field is missing or invalid.
    #[error("malformed HTTP message: {0}")]
    Malformed(&'static str),

    /// Allocation failed while copying message bytes.
    #[error("out of memory while parsing HTTP message")]
    OutOfMemory,
}

/// Parse one request from `raw` into `req`.
///
/// If `req` holds an unfinished body from a previous call, `raw` is treated
/// as more body bytes and the request line and headers are left untouched.
pub fn parse_request(raw: &[u8], req: &mut Request) -> Result<(), ParseError> {
    if req.is_continuation() {
        req.body_state.advance(raw, &mut req.body)?;
        req.body_size = req.body.len();
        return Ok(());
    }

    req.reset();

    let header_size = header_block_len(raw).ok_or(ParseError::Malformed("header block not terminated"))?;
    req.header_size = header_size;

    let mut cursor = Cursor::new(&raw[..header_size]);
    let line = cursor
        .take_until(b"\r\n")
        .ok_or(ParseError::Malformed("request line not terminated"))?;
    let line = as_str(line)?;

    let (method, rest) = line
        .split_once(' ')
        .ok_or(ParseError::Malformed("missing space after method"))?;
    let (target, version) = rest
        .split_once(' ')
        .ok_or(ParseError::Malformed("missing space after request target"))?;
    if method.is_empty() {
        return Err(ParseError::Malformed("empty method"));
    }
    if version.is_empty() {
        return Err(ParseError::Malformed("empty HTTP version"));
    }

    req.method = method.to_string();
    req.uri = normalize_uri(target, method);
    req.version = version.to_string();

    parse_headers(&mut cursor, &mut req.headers);
    req.content = ContentInfo::from_headers(&req.headers);

    req.body_state = body_framing(&req.headers)?;
    req.body_state.advance(&raw[header_size..], &mut req.body)?;
    req.body_size = req.body.len();
    Ok(())
}

/// Parse one response from `raw` into `res`.
///
/// `request_method` is the method of the request being answered; responses
/// to HEAD never carry a body.
pub fn parse_response(raw: &[u8], res: &mut Response, request_method: Option<&str>) -> Result<(), ParseError> {
    if res.is_continuation() {
        res.body_state.advance(raw, &mut res.body)?;
        res.body_size = res.body.len();
        return Ok(());
    }

    res.reset();

    let header_size = header_block_len(raw).ok_or(ParseError::Malformed("header block not terminated"))?;
    res.header_size = header_size;

    let mut cursor = Cursor::new(&raw[..header_size]);
    let line = cursor
        .take_until(b"\r\n")
        .ok_or(ParseError::Malformed("status line not terminated"))?;
    let line = as_str(line)?;

    let (version, rest) = line
        .split_once(' ')
        .ok_or(ParseError::Malformed("missing space after HTTP version"))?;
    // The reason phrase may be empty, and some servers omit the space before it.
    let (status, reason) = rest.split_once(' ').unwrap_or((rest, ""));
    if version.is_empty() {
        return Err(ParseError::Malformed("empty HTTP version"));
    }
    let status_code: u16 = status
        .parse()
        .ok()
        .filter(|code| (100..1000).contains(code))
        .ok_or(ParseError::Malformed("invalid status code"))?;

    res.version = version.to_string();
    res.status_code = status_code;
    res.reason_phrase = reason.to_string();

    parse_headers(&mut cursor, &mut res.headers);
    res.content = ContentInfo::from_headers(&res.headers);

    let bodyless = res.status_forbids_body()
        || match request_method {
            Some(m) if m.eq_ignore_ascii_case("HEAD") => true,
            Some(m) if m.eq_ignore_ascii_case("CONNECT") => (200..300).contains(&status_code),
            _ => false,
        };
    res.body_state = if bodyless {
        BodyState::Complete
    } else {
        body_framing(&res.headers)?
    };
    res.body_state.advance(&raw[header_size..], &mut res.body)?;
    res.body_size = res.body.len();
    Ok(())
}

/// Reduce a raw request target to the path the origin server sees.
///
/// - `OPTIONS` always yields `*`
/// - absolute-form (`scheme://authority/path`) keeps only `/path`, or `/`
///   when there is no path
/// - any fragment is dropped
/// - an empty result becomes `/`
pub fn normalize_uri(raw: &str, method: &str) -> String {
    if method.eq_ignore_ascii_case("OPTIONS") {
        return "*".to_string();
    }

    let path = match raw.find("://") {
        Some(idx) => {
            let after_scheme = &raw[idx + 3..];
            match after_scheme.find('/') {
                Some(slash) => &after_scheme[slash..],
                None => return "/".to_string(),
            }
        }
        None => raw,
    };

    let path = path.split('#').next().unwrap_or_default();
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Header lines up to the blank line, at most `MAX_HEADERS` of them. Lines
/// without a colon are skipped; anything past the limit is left unparsed.
fn parse_headers(cursor: &mut Cursor<'_>, headers: &mut Headers) {
    while !headers.is_full() {
        let Some(line) = cursor.take_until(b"\r\n") else {
            break;
        };
        if line.is_empty() {
            break;
        }
        let Some(colon) = memchr(b':', line) else {
            continue;
        };

        let key = String::from_utf8_lossy(&line[..colon]);
        let value = String::from_utf8_lossy(&line[colon + 1..]);
        headers.push(
            key.trim(),
            value.trim_matches(|c| c == ' ' || c == '\t'),
        );
    }
}

fn body_framing(headers: &Headers) -> Result<BodyState, ParseError> {
    if headers.get("Transfer-Encoding").map(is_chunked_coding).unwrap_or(false) {
        return Ok(BodyState::Chunked(ChunkedDecoder::new()));
    }

    match headers.get("Content-Length") {
        Some(value) => {
            let length: u64 = value
                .trim()
                .parse()
                .map_err(|_| ParseError::Malformed("invalid Content-Length"))?;
            if length == 0 {
                Ok(BodyState::Complete)
            } else {
                Ok(BodyState::Fixed { remaining: length })
            }
        }
        None => Ok(BodyState::Complete),
    }
}

/// Chunked must be the final transfer coding.
fn is_chunked_coding(value: &str) -> bool {
    value
        .rsplit(',')
        .next()
        .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
        .unwrap_or(false)
}

fn as_str(bytes: &[u8]) -> Result<&str, ParseError> {
    std::str::from_utf8(bytes).map_err(|_| ParseError::Malformed("start line is not valid UTF-8"))
}
