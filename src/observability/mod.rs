//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! listener / workers produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (counters, gauges)
//!     → dump.rs (request/response/hex renderings at trace level)
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every worker log event
//! - Metrics are cheap (no-ops unless an exporter is installed)
//! - Traffic dumps are opt-in; they never influence forwarding

pub mod dump;
pub mod logging;
pub mod metrics;
