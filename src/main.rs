//! Forward HTTP/HTTPS proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client                         ┌──────────────────────────────────────┐
//!     ───────────────────────────────┼─▶ listener ──▶ slot table (64)       │
//!                                    │                    │                 │
//!                                    │                    ▼                 │
//!                                    │   worker: parse ─▶ connect ─▶ relay ─┼──▶ Origin
//!                                    │           └─ CONNECT ─▶ tunnel ──────┼──▶ server
//!                                    │                                      │
//!                                    │   signals ─▶ shutdown ─▶ cancel all  │
//!                                    └──────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use forward_proxy::config::{load_config, validate_config, ProxyConfig};
use forward_proxy::lifecycle::signals;
use forward_proxy::observability::{logging, metrics};
use forward_proxy::{Listener, Shutdown};

#[derive(Parser, Debug)]
#[command(name = "forward-proxy", version, about = "Forward HTTP/HTTPS proxy with CONNECT tunnelling")]
struct Cli {
    /// TCP port to listen on
    port: u16,

    /// Optional TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Maximum concurrent connections
    #[arg(long, value_name = "N")]
    max_connections: Option<usize>,

    /// Seconds of inactivity before a connection is closed
    #[arg(long, value_name = "SECS")]
    idle_timeout: Option<u64>,

    /// Dump parsed requests and responses at trace level
    #[arg(long)]
    inspect: bool,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        config.listener.port = self.port;
        if let Some(n) = self.max_connections {
            config.listener.max_connections = n;
        }
        if let Some(secs) = self.idle_timeout {
            config.timeouts.idle_secs = secs;
        }
        if self.inspect {
            config.observability.inspect_traffic = true;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match load_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("forward-proxy: {}: {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    if let Err(errors) = validate_config(&config) {
        for e in errors {
            eprintln!("forward-proxy: {}", e);
        }
        return ExitCode::FAILURE;
    }

    logging::init(&config.observability.log_level);
    tracing::info!("forward-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        port = config.listener.port,
        max_connections = config.listener.max_connections,
        max_message_size = config.limits.max_message_size,
        idle_timeout_secs = config.timeouts.idle_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = match Listener::bind(&config).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port = config.listener.port, "Could not start listener");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = Arc::new(Shutdown::new());
    let shutdown_rx = shutdown.subscribe();
    signals::spawn_signal_handler(Arc::clone(&shutdown));

    listener.run(shutdown_rx).await;

    tracing::info!("Shutdown complete");
    ExitCode::SUCCESS
}
