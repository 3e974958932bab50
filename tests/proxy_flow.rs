//! End-to-end proxying: plain HTTP, bodies split across reads, and CONNECT.

use std::time::Duration;

use forward_proxy::net::worker::CONNECTION_ESTABLISHED;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

mod common;

#[tokio::test]
async fn absolute_uri_request_reaches_origin() {
    let backend = common::start_mock_backend("Hello from origin").await;
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!(
        "GET http://{0}/greeting HTTP/1.1\r\nHost: {0}\r\nUser-Agent: test\r\n\r\n",
        backend
    );
    client.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();

    let text = String::from_utf8(response).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("\r\n\r\nHello from origin"));
}

#[tokio::test]
async fn http_client_through_proxy() {
    let backend = common::start_mock_backend("proxied body").await;
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{}", proxy.addr)).unwrap())
        .build()
        .unwrap();

    let response = client
        .get(format!("http://{}/resource", backend))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "proxied body");
}

#[tokio::test]
async fn chunked_body_split_across_writes_is_forwarded_intact() {
    let (backend, captured) = common::start_capture_backend(b"0\r\n\r\n").await;
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let head = format!(
        "POST /upload HTTP/1.1\r\nHost: {}\r\nTransfer-Encoding: chunked\r\n\r\n",
        backend
    );
    let first = "5\r\nhel";
    let second = "lo\r\n6\r\n world\r\n0\r\n\r\n";

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client.write_all(head.as_bytes()).await.unwrap();
    client.write_all(first.as_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.write_all(second.as_bytes()).await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), captured)
        .await
        .unwrap()
        .unwrap();
    let expected = format!("{}{}{}", head, first, second);
    assert_eq!(received, expected.as_bytes());

    let mut reply = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), client.read_to_end(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert!(reply.starts_with(b"HTTP/1.1 201 Created\r\n"));
}

#[tokio::test]
async fn connect_tunnel_relays_opaque_bytes() {
    let echo = common::start_echo_server().await;
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let connect = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", echo);
    client.write_all(connect.as_bytes()).await.unwrap();

    let mut reply = vec![0u8; CONNECTION_ESTABLISHED.len()];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, CONNECTION_ESTABLISHED);

    // Bytes that would be malformed HTTP must pass untouched.
    let payload: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
    client.write_all(&payload).await.unwrap();

    let mut echoed = vec![0u8; payload.len()];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, payload);

    client.write_all(b"\x16\x03\x01 not http\r\n\r\n").await.unwrap();
    let mut more = [0u8; 16];
    client.read_exact(&mut more).await.unwrap();
    assert_eq!(&more, b"\x16\x03\x01 not http\r\n\r\n");
}

#[tokio::test]
async fn bytes_sent_with_connect_reach_the_tunnel() {
    let echo = common::start_echo_server().await;
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let connect = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\nEARLY", echo);
    client.write_all(connect.as_bytes()).await.unwrap();

    let mut reply = vec![0u8; CONNECTION_ESTABLISHED.len() + 5];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&reply[..CONNECTION_ESTABLISHED.len()], CONNECTION_ESTABLISHED);
    assert_eq!(&reply[CONNECTION_ESTABLISHED.len()..], b"EARLY");
}

#[tokio::test]
async fn connect_after_plain_request_opens_new_upstream() {
    let (origin, mut origin_rx) = common::start_keepalive_origin().await;
    let echo = common::start_echo_server().await;
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let get = format!("GET http://{0}/ HTTP/1.1\r\nHost: {0}\r\n\r\n", origin);
    client.write_all(get.as_bytes()).await.unwrap();

    let expected = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok";
    let mut response = vec![0u8; expected.len()];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut response))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&response[..], &expected[..]);

    let connect = format!("CONNECT {0} HTTP/1.1\r\nHost: {0}\r\n\r\n", echo);
    client.write_all(connect.as_bytes()).await.unwrap();
    let mut reply = vec![0u8; CONNECTION_ESTABLISHED.len()];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut reply))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply, CONNECTION_ESTABLISHED);

    client.write_all(b"SECRET").await.unwrap();
    let mut echoed = [0u8; 6];
    tokio::time::timeout(Duration::from_secs(5), client.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed, b"SECRET");

    // The first origin's connection was closed without seeing tunnel bytes.
    let leaked = tokio::time::timeout(Duration::from_secs(2), origin_rx.recv())
        .await
        .unwrap();
    assert_eq!(leaked, None);
}

#[tokio::test]
async fn request_without_host_is_dropped() {
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    client.write_all(b"GET /nohost HTTP/1.1\r\nAccept: */*\r\n\r\n").await.unwrap();

    assert!(common::is_closed(&mut client, Duration::from_secs(2)).await);
    assert!(common::wait_for(|| proxy.slots.is_empty(), Duration::from_secs(2)).await);
}

#[tokio::test]
async fn unreachable_origin_drops_client() {
    let closed_port = {
        let l = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        l.local_addr().unwrap()
    };
    let proxy = common::start_proxy(common::test_config(4, 30)).await;

    let mut client = TcpStream::connect(proxy.addr).await.unwrap();
    let request = format!("GET / HTTP/1.1\r\nHost: {}\r\n\r\n", closed_port);
    client.write_all(request.as_bytes()).await.unwrap();

    assert!(common::is_closed(&mut client, Duration::from_secs(5)).await);
    assert!(common::wait_for(|| proxy.slots.is_empty(), Duration::from_secs(2)).await);
}
