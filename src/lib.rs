//! Forward HTTP/HTTPS proxy library.
//!
//! Plain HTTP requests are parsed far enough to find their `Host` and then
//! relayed verbatim; CONNECT switches the connection to an opaque tunnel.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use lifecycle::Shutdown;
pub use net::admission::SlotTable;
pub use net::listener::Listener;
