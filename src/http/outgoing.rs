//! Outgoing request derivation.
//!
//! # Responsibilities
//! - Derive the outgoing request descriptor from an inbound request
//! - Strip the target header so it never travels upstream
//! - Normalize the `connection` header for non-upgrading requests
//! - Resolve destination host/port/path from the target URL
//!
//! # Design Decisions
//! - Pure derivation: no I/O, deterministic for a given input
//! - An unparseable target leaves the destination unset; callers decide
//!   what "no destination known" means for their path

use axum::http::header::{HeaderMap, HeaderValue, CONNECTION, HOST};
use axum::http::Method;
use url::Url;

use crate::http::options::ForwardOptions;

/// Where the destination URL comes from.
#[derive(Debug, Clone, Copy)]
pub enum TargetSource<'a> {
    /// Read the destination from the configured target header.
    Header,
    /// Use a pre-supplied destination instead of the header.
    Static(&'a str),
}

/// Descriptor for one outgoing request.
///
/// Derived exactly once per inbound request and never mutated after the
/// outgoing transmission starts.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: Option<String>,
    /// Always false: every outgoing request uses a fresh connection.
    pub reuse_connections: bool,
}

impl OutgoingRequest {
    /// The resolved destination, when the target URL yielded one.
    pub fn destination(&self) -> Option<(&str, u16, &str)> {
        match (&self.host, self.port, &self.path) {
            (Some(host), Some(port), Some(path)) => Some((host, port, path)),
            _ => None,
        }
    }
}

/// Derive the outgoing request descriptor from an inbound request.
pub fn build_outgoing(
    method: &Method,
    inbound: &HeaderMap,
    target: TargetSource<'_>,
    options: &ForwardOptions,
) -> OutgoingRequest {
    let mut headers = inbound.clone();
    headers.remove(&options.target_header);

    // Anything that is not explicitly upgrading must not hold the upstream
    // connection open.
    if !connection_requests_upgrade(&headers) {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));
    }

    let target_url = match target {
        TargetSource::Header => inbound
            .get(&options.target_header)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned),
        TargetSource::Static(url) => Some(url.to_string()),
    };

    let mut outgoing = OutgoingRequest {
        method: method.clone(),
        headers,
        host: None,
        port: None,
        path: None,
        reuse_connections: false,
    };

    if let Some(raw) = target_url {
        match Url::parse(&raw) {
            Ok(url) => apply_target_url(&mut outgoing, &url),
            Err(error) => {
                tracing::debug!(url = %raw, error = %error, "can't parse forwarding target");
            }
        }
    }

    outgoing
}

fn apply_target_url(outgoing: &mut OutgoingRequest, url: &Url) {
    let Some(hostname) = url.host_str() else {
        tracing::debug!(url = %url, "forwarding target has no host");
        return;
    };

    let port = url.port().unwrap_or(match url.scheme() {
        "https" | "wss" => 443,
        _ => 80,
    });
    let path = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    if let Ok(host_value) = HeaderValue::from_str(&format!("{}:{}", hostname, port)) {
        outgoing.headers.insert(HOST, host_value);
    }
    outgoing.host = Some(hostname.to_string());
    outgoing.port = Some(port);
    outgoing.path = Some(path);
}

/// Matches a `connection` header that carries the `upgrade` token
/// (optionally comma-separated, case-insensitive).
fn connection_requests_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(CONNECTION)
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
        })
        .unwrap_or(false)
}
