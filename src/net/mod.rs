//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop)
//!     → admission.rs (slot table; full → socket dropped)
//!     → worker.rs (per-connection state machine)
//!         → upstream.rs (resolve + connect on first Host)
//!         → relay.rs (write every byte, both directions)
//!
//! Connection States:
//!     AwaitingRequest → ResolvingUpstream → Relaying ─┬→ Closed
//!                                                     └→ Tunneling → Closed
//! ```
//!
//! # Design Decisions
//! - Fixed-capacity admission; no accept queue beyond the kernel backlog
//! - Each worker owns its sockets; dropping the worker closes them
//! - Cancellation reaches workers through their slot

pub mod admission;
pub mod connection;
pub mod listener;
pub mod relay;
pub mod upstream;
pub mod worker;
