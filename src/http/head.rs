//! Raw HTTP/1.1 message-head reading, parsing, and serialization.
//!
//! # Responsibilities
//! - Read a message head off a socket without consuming past it
//! - Parse request heads for classification and the upgrade path
//! - Parse response heads preserving original header casing and order
//! - Serialize the outgoing handshake request and the literal
//!   `101 Switching Protocols` reply
//!
//! # Design Decisions
//! - Bytes past the head stay in the caller's buffer; they are "head bytes"
//!   that must be replayed into whichever stream they belong to
//! - Response headers are kept as ordered (name, value) lines, one entry per
//!   header line, so re-serialization reproduces the upstream head faithfully

use std::io;

use axum::http::header::{HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, Version};
use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Upper bound on a message head; anything larger is rejected.
pub const MAX_HEAD_BYTES: usize = 64 * 1024;

const MAX_HEADERS: usize = 100;

/// Errors produced while parsing a message head.
#[derive(Debug, Error)]
pub enum HeadError {
    #[error("malformed message head: {0}")]
    Malformed(#[from] httparse::Error),

    #[error("message head is incomplete")]
    Incomplete,

    #[error("unsupported request method")]
    InvalidMethod,

    #[error("invalid header in message head")]
    InvalidHeader,
}

/// A parsed inbound request head.
#[derive(Debug)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub headers: HeaderMap,
}

/// A parsed upstream response head.
///
/// Headers keep their wire order and original casing, one entry per line;
/// multi-value headers therefore arrive already expanded.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: u16,
    pub reason: String,
    pub headers: Vec<(String, Vec<u8>)>,
}

/// Read from `stream` into `buf` until a full head (`\r\n\r\n`) is buffered.
///
/// Returns the offset one past the head terminator, or `None` when the peer
/// closed without sending anything. Bytes beyond the returned offset belong
/// to whatever follows the head and must be replayed, not dropped.
pub async fn read_head<S>(stream: &mut S, buf: &mut BytesMut) -> io::Result<Option<usize>>
where
    S: AsyncRead + Unpin,
{
    loop {
        if let Some(end) = find_head_end(buf) {
            return Ok(Some(end));
        }
        if buf.len() >= MAX_HEAD_BYTES {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "message head exceeds size limit",
            ));
        }
        let n = stream.read_buf(buf).await?;
        if n == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed inside message head",
                ))
            };
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4)
}

/// Parse a complete request head.
pub fn parse_request_head(head: &[u8]) -> Result<RequestHead, HeadError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Request::new(&mut storage);
    if parsed.parse(head)?.is_partial() {
        return Err(HeadError::Incomplete);
    }

    let method = parsed
        .method
        .ok_or(HeadError::Incomplete)
        .and_then(|m| Method::from_bytes(m.as_bytes()).map_err(|_| HeadError::InvalidMethod))?;
    let target = parsed.path.ok_or(HeadError::Incomplete)?.to_string();
    let version = match parsed.version {
        Some(0) => Version::HTTP_10,
        _ => Version::HTTP_11,
    };

    let mut headers = HeaderMap::with_capacity(parsed.headers.len());
    for header in parsed.headers.iter() {
        let name = HeaderName::from_bytes(header.name.as_bytes())
            .map_err(|_| HeadError::InvalidHeader)?;
        let value =
            HeaderValue::from_bytes(header.value).map_err(|_| HeadError::InvalidHeader)?;
        headers.append(name, value);
    }

    Ok(RequestHead {
        method,
        target,
        version,
        headers,
    })
}

/// Parse a complete response head, keeping original header casing and order.
pub fn parse_response_head(head: &[u8]) -> Result<ResponseHead, HeadError> {
    let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut parsed = httparse::Response::new(&mut storage);
    if parsed.parse(head)?.is_partial() {
        return Err(HeadError::Incomplete);
    }

    let status = parsed.code.ok_or(HeadError::Incomplete)?;
    let reason = parsed.reason.unwrap_or("").to_string();
    let headers = parsed
        .headers
        .iter()
        .map(|h| (h.name.to_string(), h.value.to_vec()))
        .collect();

    Ok(ResponseHead {
        status,
        reason,
        headers,
    })
}

/// Serialize an outgoing request head for the upgrade handshake.
pub fn serialize_request_head(method: &Method, path: &str, headers: &HeaderMap) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(method.as_str().as_bytes());
    head.push(b' ');
    head.extend_from_slice(path.as_bytes());
    head.extend_from_slice(b" HTTP/1.1\r\n");
    for (name, value) in headers {
        head.extend_from_slice(name.as_str().as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value.as_bytes());
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}

/// Re-serialize an upstream 101 head, literally, for the client socket.
///
/// The status line is always `HTTP/1.1 101 Switching Protocols`; headers are
/// written one line per value, in upstream order, with upstream casing.
pub fn switching_protocols_head(response: &ResponseHead) -> Vec<u8> {
    let mut head = Vec::with_capacity(256);
    head.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    for (name, value) in &response.headers {
        head.extend_from_slice(name.as_bytes());
        head.extend_from_slice(b": ");
        head.extend_from_slice(value);
        head.extend_from_slice(b"\r\n");
    }
    head.extend_from_slice(b"\r\n");
    head
}
