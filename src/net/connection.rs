//! Connection identity and lifecycle states.
//!
//! # Responsibilities
//! - Generate unique connection IDs (worker identities) for slots and tracing
//! - Name the states a connection worker moves through

use std::sync::atomic::{AtomicU64, Ordering};

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough: only uniqueness is needed.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection and the worker serving it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Worker state.
///
/// ```text
/// AwaitingRequest → ResolvingUpstream → Relaying | Tunneling → Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the first client request.
    AwaitingRequest,
    /// Connecting to the server named by `Host`.
    ResolvingUpstream,
    /// Plain HTTP: client requests parsed, then relayed verbatim.
    Relaying,
    /// After CONNECT: opaque bytes in both directions, never parsed.
    Tunneling,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::AwaitingRequest => "awaiting_request",
            ConnectionState::ResolvingUpstream => "resolving_upstream",
            ConnectionState::Relaying => "relaying",
            ConnectionState::Tunneling => "tunneling",
            ConnectionState::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
