//! Plain request/response relay.
//!
//! # Responsibilities
//! - Derive the outgoing descriptor and stream the inbound body upstream
//! - Answer the fixed fallback body for requests that are not meant to be
//!   forwarded (no target header)
//! - Run the response pass pipeline before re-emitting the upstream response
//!
//! # Design Decisions
//! - The inbound body is handed to the client as-is: no buffering beyond
//!   what the transport requires
//! - Upstream response headers keep their original casing; the case map
//!   captured by the client rides the response extensions to the server side
//! - Failures are typed, not status codes; the server façade decides what
//!   the client sees

use axum::body::Body;
use axum::http::{Request, Response, StatusCode, Uri};
use axum::response::IntoResponse;

use crate::http::error::RelayError;
use crate::http::outgoing::{build_outgoing, TargetSource};
use crate::http::passes;
use crate::http::server::AppState;

/// Relay one non-upgrade request, producing exactly one response.
pub async fn relay_http(
    state: &AppState,
    request: Request<Body>,
) -> Result<Response<Body>, RelayError> {
    let options = &*state.options;
    let (mut head, body) = request.into_parts();

    // Request-side passes run before the descriptor copies the headers.
    passes::delete_length(&mut head);
    let deadline = passes::upstream_deadline(options);

    let outgoing = build_outgoing(&head.method, &head.headers, TargetSource::Header, options);

    if !head.headers.contains_key(&options.target_header) {
        // Intentional fallback for requests that are not meant to be
        // forwarded; no upstream connection is attempted.
        tracing::debug!("no target header, answering fallback body");
        return Ok((StatusCode::OK, options.fallback_body.clone()).into_response());
    }

    let Some((host, port, path)) = outgoing.destination() else {
        return Err(RelayError::InvalidTarget);
    };

    for hook in state.hooks.iter() {
        hook.on_proxy_request(&outgoing, &head);
    }

    let uri = Uri::try_from(format!("http://{}:{}{}", host, port, path))
        .map_err(|_| RelayError::InvalidTarget)?;
    let mut upstream_request = Request::builder()
        .method(head.method.clone())
        .uri(uri)
        .body(body)?;
    *upstream_request.headers_mut() = outgoing.headers.clone();

    tracing::debug!(
        method = %head.method,
        host = %host,
        port = port,
        path = %path,
        "Forwarding request"
    );

    let response = match deadline {
        Some(limit) => tokio::time::timeout(limit, state.client.request(upstream_request))
            .await
            .map_err(|_| RelayError::UpstreamTimeout)??,
        None => state.client.request(upstream_request).await?,
    };

    let (mut response_head, response_body) = response.into_parts();
    state.passes.run(&head, &mut response_head, options);

    Ok(Response::from_parts(response_head, Body::new(response_body)))
}
