//! Connection worker: one per accepted client.
//!
//! # Responsibilities
//! - Wait on the client socket (and the upstream socket once connected)
//! - Parse client requests, connect upstream on the first `Host`
//! - Answer CONNECT and switch to opaque tunnelling
//! - Relay bytes verbatim in both directions
//! - Stop on peer close, I/O error, malformed input, inactivity or cancellation
//!
//! # Design Decisions
//! - Server responses are relayed without being parsed; parsing them is a
//!   trace-level diagnostic only and never changes what is forwarded
//! - After CONNECT the parser is never invoked again on this connection
//! - Sockets, scratch messages and the slot are owned values, released by
//!   drop on every exit path

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;

use crate::config::ProxyConfig;
use crate::http::{parse_request, parse_response, ParseError, Request, Response};
use crate::lifecycle::CancelSignal;
use crate::net::admission::SlotGuard;
use crate::net::connection::{ConnectionId, ConnectionState};
use crate::net::relay;
use crate::net::upstream::{self, UpstreamError};
use crate::observability::dump;
use crate::observability::metrics::{self, Direction};

/// Reply sent to the client once a CONNECT target is reachable.
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Settings shared by all workers.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// A worker with no readable data for this long exits.
    pub idle_timeout: Duration,
    /// Per-address upstream connect timeout.
    pub connect_timeout: Duration,
    /// Size of each socket read.
    pub max_message_size: usize,
    /// Dump parsed traffic at trace level.
    pub inspect_traffic: bool,
}

impl WorkerConfig {
    pub fn from_config(config: &ProxyConfig) -> Self {
        Self {
            idle_timeout: config.timeouts.idle(),
            connect_timeout: config.timeouts.connect(),
            max_message_size: config.limits.max_message_size,
            inspect_traffic: config.observability.inspect_traffic,
        }
    }
}

/// Why a worker stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    ClientClosed,
    UpstreamClosed,
    IdleTimeout,
    Cancelled,
}

impl Exit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Exit::ClientClosed => "client_closed",
            Exit::UpstreamClosed => "upstream_closed",
            Exit::IdleTimeout => "idle_timeout",
            Exit::Cancelled => "cancelled",
        }
    }
}

/// Errors that end a connection. None of them reach beyond it.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to read from client: {0}")]
    ClientRead(#[source] io::Error),

    #[error("failed to read from upstream: {0}")]
    UpstreamRead(#[source] io::Error),

    #[error("failed to relay to client: {0}")]
    ClientWrite(#[source] io::Error),

    #[error("failed to relay to upstream: {0}")]
    UpstreamWrite(#[source] io::Error),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("request has no Host header")]
    MissingHost,

    /// Body or tunnel bytes with no upstream. Every fresh request connects
    /// before anything is relayed, so this marks an inconsistent worker.
    #[error("no upstream connection for request body")]
    NoUpstream,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl WorkerError {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerError::ClientRead(_) | WorkerError::ClientWrite(_) => "client_error",
            WorkerError::UpstreamRead(_) | WorkerError::UpstreamWrite(_) => "upstream_error",
            WorkerError::Parse(_) => "malformed_request",
            WorkerError::MissingHost => "missing_host",
            WorkerError::NoUpstream => "no_upstream",
            WorkerError::Upstream(_) => "upstream_unreachable",
        }
    }
}

enum Flow {
    Continue,
    Exit(Exit),
}

enum Event {
    Client(io::Result<usize>),
    Upstream(io::Result<usize>),
    Cancelled,
    Idle,
}

/// State of one proxied connection.
pub struct Worker {
    id: ConnectionId,
    peer: SocketAddr,
    client: TcpStream,
    upstream: Option<TcpStream>,
    request: Request,
    response: Response,
    state: ConnectionState,
    config: Arc<WorkerConfig>,
    cancel: CancelSignal,
    // Dropped last: the slot frees only after both sockets are closed.
    slot: SlotGuard,
}

impl Worker {
    pub fn new(client: TcpStream, peer: SocketAddr, slot: SlotGuard, config: Arc<WorkerConfig>) -> Self {
        Self {
            id: slot.id(),
            peer,
            client,
            upstream: None,
            request: Request::new(),
            response: Response::new(),
            state: ConnectionState::AwaitingRequest,
            config,
            cancel: slot.cancel_signal(),
            slot,
        }
    }

    /// Serve the connection until it ends. Consumes the worker, so sockets
    /// and the slot are released when this returns.
    pub async fn run(mut self) -> Result<Exit, WorkerError> {
        let mut client_buf = vec![0u8; self.config.max_message_size];
        let mut upstream_buf = vec![0u8; self.config.max_message_size];

        let result = self.event_loop(&mut client_buf, &mut upstream_buf).await;
        let last_state = self.state;
        self.state = ConnectionState::Closed;

        match &result {
            Ok(exit) => {
                tracing::info!(
                    connection_id = %self.id,
                    peer_addr = %self.peer,
                    slot = self.slot.slot(),
                    reason = exit.as_str(),
                    state = %last_state,
                    "Connection closed"
                );
                metrics::record_worker_exit(exit.as_str());
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.id,
                    peer_addr = %self.peer,
                    slot = self.slot.slot(),
                    error = %e,
                    state = %last_state,
                    "Connection dropped"
                );
                metrics::record_worker_exit(e.as_str());
            }
        }
        result
    }

    async fn event_loop(&mut self, client_buf: &mut [u8], upstream_buf: &mut [u8]) -> Result<Exit, WorkerError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(Exit::Cancelled);
            }

            let event = {
                let Self {
                    client,
                    upstream,
                    cancel,
                    config,
                    ..
                } = self;

                tokio::select! {
                    r = client.read(client_buf) => Event::Client(r),
                    r = read_upstream(upstream, upstream_buf) => Event::Upstream(r),
                    _ = cancel.cancelled() => Event::Cancelled,
                    _ = tokio::time::sleep(config.idle_timeout) => Event::Idle,
                }
            };

            let flow = match event {
                Event::Client(Ok(0)) => return Ok(Exit::ClientClosed),
                Event::Client(Ok(n)) => self.on_client_data(&client_buf[..n]).await?,
                Event::Client(Err(e)) => return Err(WorkerError::ClientRead(e)),
                Event::Upstream(Ok(0)) => return Ok(Exit::UpstreamClosed),
                Event::Upstream(Ok(n)) => self.on_upstream_data(&upstream_buf[..n]).await?,
                Event::Upstream(Err(e)) => return Err(WorkerError::UpstreamRead(e)),
                Event::Cancelled => return Ok(Exit::Cancelled),
                Event::Idle => return Ok(Exit::IdleTimeout),
            };

            if let Flow::Exit(exit) = flow {
                return Ok(exit);
            }
        }
    }

    async fn on_client_data(&mut self, data: &[u8]) -> Result<Flow, WorkerError> {
        tracing::debug!(connection_id = %self.id, bytes = data.len(), state = %self.state, "Received from client");

        if self.state == ConnectionState::Tunneling {
            return self.send_upstream(data).await;
        }

        let continuation = self.request.is_continuation();
        parse_request(data, &mut self.request)?;

        if !continuation {
            tracing::debug!(
                connection_id = %self.id,
                method = %self.request.method,
                uri = %self.request.uri,
                "Request parsed"
            );
            if self.config.inspect_traffic {
                tracing::trace!(connection_id = %self.id, "\n{}", dump::request(&self.request));
            }

            let host = self.request.host().ok_or(WorkerError::MissingHost)?.to_string();

            // A tunnel always goes to the CONNECT authority, never to an
            // upstream left over from earlier plain requests.
            if self.request.is_connect() && self.upstream.take().is_some() {
                tracing::debug!(connection_id = %self.id, upstream = %host, "Replacing upstream for CONNECT");
            }

            if self.upstream.is_none() {
                self.state = ConnectionState::ResolvingUpstream;
                let connect = upstream::connect(&host, self.config.connect_timeout);
                let stream = match until_cancelled(&mut self.cancel, connect).await {
                    Some(stream) => stream?,
                    None => return Ok(Flow::Exit(Exit::Cancelled)),
                };
                tracing::info!(connection_id = %self.id, upstream = %host, "Upstream connected");
                self.upstream = Some(stream);
                self.state = ConnectionState::Relaying;
            }

            if self.request.is_connect() {
                let flow = send(&mut self.client, CONNECTION_ESTABLISHED, &mut self.cancel, Direction::UpstreamToClient)
                    .await
                    .map_err(WorkerError::ClientWrite)?;
                // The CONNECT request itself is not forwarded.
                self.state = ConnectionState::Tunneling;
                metrics::record_tunnel_established();
                tracing::info!(connection_id = %self.id, upstream = %host, "Tunnel established");

                // Bytes after the header block in the same read are tunnel payload.
                let early = data.get(self.request.header_size..).unwrap_or_default();
                if matches!(flow, Flow::Continue) && !early.is_empty() {
                    return self.send_upstream(early).await;
                }
                return Ok(flow);
            }
        }

        self.send_upstream(data).await
    }

    async fn on_upstream_data(&mut self, data: &[u8]) -> Result<Flow, WorkerError> {
        tracing::debug!(connection_id = %self.id, bytes = data.len(), state = %self.state, "Received from upstream");

        if self.config.inspect_traffic && self.state != ConnectionState::Tunneling {
            self.inspect_response(data);
        }

        send(&mut self.client, data, &mut self.cancel, Direction::UpstreamToClient)
            .await
            .map_err(WorkerError::ClientWrite)
    }

    async fn send_upstream(&mut self, data: &[u8]) -> Result<Flow, WorkerError> {
        let upstream = self.upstream.as_mut().ok_or(WorkerError::NoUpstream)?;
        send(upstream, data, &mut self.cancel, Direction::ClientToUpstream)
            .await
            .map_err(WorkerError::UpstreamWrite)
    }

    /// Parse a server response for the trace log only.
    fn inspect_response(&mut self, data: &[u8]) {
        match parse_response(data, &mut self.response, Some(self.request.method.as_str())) {
            Ok(()) => {
                tracing::trace!(connection_id = %self.id, "\n{}", dump::response(&self.response));
            }
            Err(e) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Response not inspectable");
                self.response = Response::new();
            }
        }
    }
}

/// Read from the upstream socket, or never resolve if there is none yet.
async fn read_upstream(upstream: &mut Option<TcpStream>, buf: &mut [u8]) -> io::Result<usize> {
    match upstream {
        Some(stream) => stream.read(buf).await,
        None => std::future::pending().await,
    }
}

/// Forward `data` to `dest` unless cancellation arrives first.
async fn send(
    dest: &mut TcpStream,
    data: &[u8],
    cancel: &mut CancelSignal,
    direction: Direction,
) -> io::Result<Flow> {
    match until_cancelled(cancel, relay::forward(dest, data)).await {
        Some(Ok(())) => {
            metrics::record_bytes_relayed(direction, data.len());
            Ok(Flow::Continue)
        }
        Some(Err(e)) => Err(e),
        None => Ok(Flow::Exit(Exit::Cancelled)),
    }
}

async fn until_cancelled<F: Future>(cancel: &mut CancelSignal, fut: F) -> Option<F::Output> {
    tokio::select! {
        out = fut => Some(out),
        _ = cancel.cancelled() => None,
    }
}
