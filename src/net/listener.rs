//! TCP listener with slot-based admission.
//!
//! # Responsibilities
//! - Bind the listening socket
//! - Accept incoming TCP connections
//! - Admit each one into the slot table or drop it immediately
//! - On shutdown, cancel every worker and wait for the table to drain
//!
//! # Design Decisions
//! - A full table closes the new socket; nothing is queued and the client gets
//!   no reply
//! - Accept errors are logged and the loop continues
//! - The listening socket is closed only after workers have drained

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::net::admission::SlotTable;
use crate::net::connection::ConnectionId;
use crate::net::worker::{Worker, WorkerConfig};
use crate::observability::metrics;

/// Backoff after a failed accept, so persistent errors do not spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// Accepts clients and hands each admitted one to its own worker task.
pub struct Listener {
    inner: TcpListener,
    slots: Arc<SlotTable>,
    worker_config: Arc<WorkerConfig>,
    drain_timeout: Duration,
}

impl Listener {
    /// Bind to the configured address and size the slot table.
    pub async fn bind(config: &ProxyConfig) -> Result<Self, ListenerError> {
        let addr = config.listener.bind_address();
        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            max_connections = config.listener.max_connections,
            idle_timeout_secs = config.timeouts.idle_secs,
            "Listener bound"
        );

        Ok(Self {
            inner: listener,
            slots: Arc::new(SlotTable::new(config.listener.max_connections)),
            worker_config: Arc::new(WorkerConfig::from_config(config)),
            drain_timeout: config.timeouts.drain(),
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Shared handle to the slot table.
    pub fn slots(&self) -> Arc<SlotTable> {
        Arc::clone(&self.slots)
    }

    /// Accept until `shutdown` fires, then cancel and drain all workers.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Listener stopping");
                    break;
                }
            }
        }

        let cancelled = self.slots.cancel_all();
        tracing::info!(workers = cancelled.len(), "Cancelling active connections");

        if !self.slots.wait_until_empty(self.drain_timeout).await {
            tracing::warn!(
                remaining = self.slots.occupied(),
                drain_timeout_ms = self.drain_timeout.as_millis() as u64,
                "Drain deadline elapsed with workers still running"
            );
        }

        drop(self.inner);
        tracing::info!("Listener closed");
    }

    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let id = ConnectionId::new();

        let slot = match self.slots.reserve(id) {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(peer_addr = %peer, error = %e, "Max number of connections reached, dropping connection");
                metrics::record_connection_rejected();
                drop(stream);
                return;
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(connection_id = %id, error = %e, "Failed to set TCP_NODELAY");
        }

        tracing::info!(
            connection_id = %id,
            peer_addr = %peer,
            slot = slot.slot(),
            active = self.slots.occupied(),
            "Connection accepted"
        );
        metrics::record_connection_accepted();
        metrics::set_active_connections(self.slots.occupied());

        let span = tracing::info_span!("connection", id = %id);
        let worker = Worker::new(stream, peer, slot, Arc::clone(&self.worker_config));
        let slots = Arc::clone(&self.slots);

        tokio::spawn(
            async move {
                // Errors are logged by the worker itself.
                let _ = worker.run().await;
                metrics::set_active_connections(slots.occupied());
            }
            .instrument(span),
        );
    }
}
