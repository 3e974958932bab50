//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use forward_proxy::{Listener, ProxyConfig, Shutdown, SlotTable};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// A proxy running on an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub slots: Arc<SlotTable>,
    pub shutdown: Arc<Shutdown>,
    pub handle: JoinHandle<()>,
}

/// Loopback config on port 0 with the given limits.
pub fn test_config(max_connections: usize, idle_secs: u64) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.host = "127.0.0.1".parse().unwrap();
    config.listener.port = 0;
    config.listener.max_connections = max_connections;
    config.timeouts.idle_secs = idle_secs;
    config.timeouts.connect_secs = 2;
    config.timeouts.drain_secs = 2;
    config
}

pub async fn start_proxy(config: ProxyConfig) -> TestProxy {
    let listener = Listener::bind(&config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let slots = listener.slots();
    let shutdown = Arc::new(Shutdown::new());
    let handle = tokio::spawn(listener.run(shutdown.subscribe()));

    TestProxy {
        addr,
        slots,
        shutdown,
        handle,
    }
}

/// Start a mock origin that answers every connection with `body` and closes.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    addr
}

/// Start an origin that records what it receives until the stream ends with
/// `terminator`, then replies with a short response.
pub async fn start_capture_backend(terminator: &'static [u8]) -> (SocketAddr, oneshot::Receiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while !received.ends_with(terminator) {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => received.extend_from_slice(&buf[..n]),
            }
        }
        let _ = tx.send(received);
        let _ = socket
            .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n")
            .await;
        let _ = socket.shutdown().await;
    });

    (addr, rx)
}

/// Start an origin that answers the first request with `200 OK`, keeps the
/// connection open, and reports every later read on the returned channel.
/// The channel closes when the proxy drops the connection.
pub async fn start_keepalive_origin() -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut buf = [0u8; 4096];
        if socket.read(&mut buf).await.is_err() {
            return;
        }
        let _ = socket
            .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
            .await;
        loop {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        return;
                    }
                }
            }
        }
    });

    (addr, rx)
}

/// Start a TCP echo server.
pub async fn start_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// Poll `check` every 10ms until it holds or `deadline` passes.
pub async fn wait_for<F: Fn() -> bool>(check: F, deadline: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// True if the peer closed (EOF or reset) within `deadline`.
pub async fn is_closed(stream: &mut TcpStream, deadline: Duration) -> bool {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(deadline, stream.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => true,
        Ok(Ok(_)) | Err(_) => false,
    }
}
