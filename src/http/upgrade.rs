//! WebSocket upgrade relay.
//!
//! # Responsibilities
//! - Validate the upgrade preconditions (GET + `upgrade: websocket`)
//! - Perform the upstream handshake over a raw connection
//! - Re-emit the upstream 101 head literally to the client
//! - Splice the two sockets bidirectionally until either side closes
//!
//! # Lifecycle
//! ```text
//! Validating → Connecting → AwaitingUpstreamHandshake → Splicing → Closed
//! ```
//! Terminal on first failure; errors never propagate out of the relay:
//! - invalid upgrade      → client socket destroyed, nothing written
//! - outgoing transport   → client socket ended cleanly
//! - upstream declines    → client socket ended cleanly
//! - error mid-splice     → counterpart socket force-closed

use std::net::SocketAddr;

use axum::http::header::UPGRADE;
use axum::http::Method;
use bytes::{Bytes, BytesMut};
use tokio::io::{copy_bidirectional, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::head::{
    parse_response_head, read_head, serialize_request_head, switching_protocols_head, RequestHead,
};
use crate::http::options::ForwardOptions;
use crate::http::outgoing::{build_outgoing, TargetSource};
use crate::net::replay::ReplayStream;
use crate::net::socket;
use crate::observability::metrics;

/// Relay one upgrade request; `pre_read` holds client bytes that arrived
/// with the request head and must reach the upstream before any fresh ones.
pub(crate) async fn relay_upgrade(
    mut client: TcpStream,
    peer: SocketAddr,
    head: RequestHead,
    pre_read: Bytes,
    options: &ForwardOptions,
) {
    // Validating: anything that cannot be proxied as a WebSocket gets a hard
    // rejection, not a proxied error response.
    let is_websocket = head
        .headers
        .get(UPGRADE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    if head.method != Method::GET || !is_websocket {
        tracing::debug!(peer = %peer, method = %head.method, "invalid upgrade request, destroying socket");
        metrics::record_upgrade("rejected");
        return;
    }

    if let Err(error) = socket::tune(&client) {
        tracing::debug!(peer = %peer, error = %error, "client socket tuning failed");
    }

    // Connecting
    let outgoing = build_outgoing(&head.method, &head.headers, TargetSource::Header, options);
    let Some((host, port, path)) = outgoing.destination() else {
        // The upgrade path does not special-case a missing target header;
        // with no destination the relay ends here like any connect failure.
        tracing::debug!(peer = %peer, "upgrade request carries no usable forwarding target");
        metrics::record_upgrade("no_target");
        let _ = client.shutdown().await;
        return;
    };

    let mut upstream = match TcpStream::connect((host, port)).await {
        Ok(stream) => stream,
        Err(error) => {
            tracing::debug!(peer = %peer, host = %host, port = port, error = %error, "upstream connect failed");
            metrics::record_upgrade("connect_failed");
            let _ = client.shutdown().await;
            return;
        }
    };

    let handshake = serialize_request_head(&head.method, path, &outgoing.headers);
    if let Err(error) = upstream.write_all(&handshake).await {
        tracing::debug!(peer = %peer, error = %error, "failed to send upstream handshake");
        metrics::record_upgrade("handshake_failed");
        let _ = client.shutdown().await;
        return;
    }

    // AwaitingUpstreamHandshake
    let mut response_buf = BytesMut::with_capacity(4 * 1024);
    let head_end = match read_head(&mut upstream, &mut response_buf).await {
        Ok(Some(end)) => end,
        Ok(None) | Err(_) => {
            tracing::debug!(peer = %peer, "upstream closed during handshake");
            metrics::record_upgrade("handshake_failed");
            let _ = client.shutdown().await;
            return;
        }
    };
    let response_head = match parse_response_head(&response_buf[..head_end]) {
        Ok(parsed) => parsed,
        Err(error) => {
            tracing::debug!(peer = %peer, error = %error, "malformed upstream handshake response");
            metrics::record_upgrade("handshake_failed");
            let _ = client.shutdown().await;
            return;
        }
    };

    if response_head.status != 101 {
        // The upstream declined to upgrade; end the client cleanly.
        tracing::debug!(peer = %peer, status = response_head.status, "upstream declined to upgrade");
        metrics::record_upgrade("declined");
        let _ = client.shutdown().await;
        return;
    }

    if let Err(error) = socket::tune(&upstream) {
        tracing::debug!(peer = %peer, error = %error, "upstream socket tuning failed");
    }

    // Bytes the upstream sent past its 101 head replay toward the client.
    let upstream_pre_read = response_buf.split_off(head_end).freeze();

    let reply = switching_protocols_head(&response_head);
    if let Err(error) = client.write_all(&reply).await {
        tracing::debug!(peer = %peer, error = %error, "failed to relay 101 to client");
        metrics::record_upgrade("handshake_failed");
        return;
    }

    // Splicing: two concurrent byte copies; EOF propagates as a write-side
    // shutdown, an error on either socket tears down both on return.
    let mut client_io = ReplayStream::new(pre_read, client);
    let mut upstream_io = ReplayStream::new(upstream_pre_read, upstream);
    match copy_bidirectional(&mut client_io, &mut upstream_io).await {
        Ok((to_upstream, to_client)) => {
            tracing::debug!(peer = %peer, to_upstream, to_client, "splice finished");
            metrics::record_upgrade("completed");
            metrics::record_splice(to_upstream, to_client);
        }
        Err(error) => {
            tracing::debug!(peer = %peer, error = %error, "splice ended with error");
            metrics::record_upgrade("error");
        }
    }
    // Closed: both sockets drop here; neither side is reconnected.
}
