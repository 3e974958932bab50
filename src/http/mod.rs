//! HTTP/1.1 framing subsystem.
//!
//! # Data Flow
//! ```text
//! raw bytes from one socket read
//!     → cursor.rs (bounds-checked delimiter search)
//!     → parser.rs (start line, headers, URI normalization)
//!     → body.rs / chunked.rs (body framing, continuation state)
//!     → message.rs (Request / Response scratch objects)
//! ```
//!
//! # Design Decisions
//! - Parser is a pure function over caller-owned buffers and messages
//! - No buffering of incomplete header blocks
//! - Body framing state is explicit and survives across reads

pub mod body;
pub mod chunked;
pub mod cursor;
pub mod message;
pub mod parser;

pub use message::{ContentInfo, Header, Headers, Request, Response, MAX_HEADERS};
pub use parser::{normalize_uri, parse_request, parse_response, ParseError};
