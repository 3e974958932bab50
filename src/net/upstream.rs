//! Upstream connection establishment.
//!
//! # Responsibilities
//! - Split a `Host` header value into host and port (default 80)
//! - Resolve the host (IPv4 and IPv6)
//! - Try each resolved address in order until one connects
//!
//! # Design Decisions
//! - No retries beyond walking the candidate list
//! - Every candidate attempt is bounded by the connect timeout
//! - Sockets of failed attempts are dropped (closed) before returning

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::{lookup_host, TcpStream};

/// Port used when the `Host` header carries none.
pub const DEFAULT_PORT: u16 = 80;

/// Errors establishing the upstream connection.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The `Host` value could not be split into host and port.
    #[error("invalid host {0:?}")]
    InvalidHost(String),

    /// Name resolution failed or produced no addresses.
    #[error("failed to resolve {host}: {source}")]
    ResolutionFailed {
        host: String,
        #[source]
        source: io::Error,
    },

    /// Every resolved address refused or failed to connect.
    #[error("failed to connect to {host} ({attempts} addresses tried)")]
    ConnectFailed {
        host: String,
        attempts: usize,
        #[source]
        last_error: Option<io::Error>,
    },
}

/// Host and port extracted from a `Host` header value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parse `host[:port]`, including bracketed IPv6 literals.
pub fn parse_host(value: &str) -> Result<HostPort, UpstreamError> {
    let value = value.trim();
    let invalid = || UpstreamError::InvalidHost(value.to_string());

    let (host, port) = if let Some(bracketed) = value.strip_prefix('[') {
        let (host, rest) = bracketed.split_once(']').ok_or_else(invalid)?;
        let port = match rest {
            "" => None,
            _ => Some(rest.strip_prefix(':').ok_or_else(invalid)?),
        };
        (host, port)
    } else if value.matches(':').count() > 1 {
        // Bare IPv6 literal; a port cannot be told apart.
        (value, None)
    } else {
        match value.split_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (value, None),
        }
    };

    if host.is_empty() {
        return Err(invalid());
    }

    let port = match port {
        None | Some("") => DEFAULT_PORT,
        Some(p) => p.parse().map_err(|_| invalid())?,
    };

    Ok(HostPort {
        host: host.to_string(),
        port,
    })
}

/// Resolve and connect to the server named by a `Host` header value.
pub async fn connect(host_header: &str, connect_timeout: Duration) -> Result<TcpStream, UpstreamError> {
    let target = parse_host(host_header)?;

    let candidates: Vec<SocketAddr> = lookup_host((target.host.as_str(), target.port))
        .await
        .map_err(|source| UpstreamError::ResolutionFailed {
            host: target.to_string(),
            source,
        })?
        .collect();

    if candidates.is_empty() {
        return Err(UpstreamError::ResolutionFailed {
            host: target.to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
        });
    }

    let mut last_error = None;
    for addr in &candidates {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                let _ = stream.set_nodelay(true);
                tracing::debug!(upstream = %target, address = %addr, "Upstream connected");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                tracing::debug!(upstream = %target, address = %addr, error = %e, "Upstream candidate failed");
                last_error = Some(e);
            }
            Err(_) => {
                tracing::debug!(upstream = %target, address = %addr, "Upstream candidate timed out");
                last_error = Some(io::Error::new(io::ErrorKind::TimedOut, "connect timed out"));
            }
        }
    }

    Err(UpstreamError::ConnectFailed {
        host: target.to_string(),
        attempts: candidates.len(),
        last_error,
    })
}
