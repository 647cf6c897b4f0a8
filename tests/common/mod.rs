//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use forward_proxy::config::ProxyConfig;
use forward_proxy::http::ProxyServer;
use forward_proxy::net::Listener;

/// Base configuration for tests: ephemeral port, no metrics exporter.
pub fn test_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.observability.metrics_enabled = false;
    config
}

/// Spawn a proxy for the given configuration; returns its bound address.
pub async fn spawn_proxy(config: ProxyConfig) -> SocketAddr {
    spawn_server(ProxyServer::new(config).expect("valid test config")).await
}

/// Spawn an already-built proxy server; returns its bound address.
pub async fn spawn_server(server: ProxyServer) -> SocketAddr {
    let listener = Listener::bind(&server.config().listener)
        .await
        .expect("bind proxy listener");
    let addr = listener.local_addr().expect("listener address");
    tokio::spawn(server.run(listener));
    addr
}

/// Start a mock upstream that answers every connection with a fixed response.
pub async fn start_mock_upstream(response: &'static str) -> SocketAddr {
    let (addr, _captured) = start_capture_upstream(response).await;
    addr
}

/// Start a mock upstream that captures each request (head plus any declared
/// body) before answering with a fixed response.
pub async fn start_capture_upstream(
    response: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<Vec<u8>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let request = read_http_request(&mut socket).await;
                        let _ = tx.send(request);
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

/// Start a mock upstream that accepts connections but never responds.
pub async fn start_silent_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let _ = read_http_request(&mut socket).await;
                        tokio::time::sleep(Duration::from_secs(30)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Write a raw request, half-close, and collect the full response bytes.
pub async fn raw_request(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response within deadline")
        .expect("readable response");
    response
}

/// Read one HTTP request (head plus `content-length` body) off a socket.
async fn read_http_request(socket: &mut TcpStream) -> Vec<u8> {
    let mut request = Vec::new();
    let mut chunk = [0u8; 4096];

    while head_end(&request).is_none() {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return request,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    let head_len = head_end(&request).unwrap_or(request.len());
    let body_len = content_length(&request[..head_len]).unwrap_or(0);
    while request.len() < head_len + body_len {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => request.extend_from_slice(&chunk[..n]),
        }
    }

    request
}

fn head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

fn content_length(head: &[u8]) -> Option<usize> {
    let text = String::from_utf8_lossy(head);
    text.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse().ok())?
    })
}
