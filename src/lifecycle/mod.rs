//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Shutdown broadcast → listener stops accepting
//!     → slot table cancels workers (CancelHandle → CancelSignal)
//!     → workers unwind → listener socket closed last
//! ```
//!
//! # Design Decisions
//! - Cooperative cancellation: workers observe their signal at every wait
//! - Cleanup is ownership-driven; there are no manually paired callbacks
//! - Shutdown has a drain deadline

pub mod shutdown;
pub mod signals;

pub use shutdown::{cancellation, CancelHandle, CancelSignal, Shutdown};
