//! Relay error taxonomy.
//!
//! The relay itself never synthesizes client-facing status codes; it reports
//! what failed and the server façade decides how to answer.

use thiserror::Error;

/// Failure modes of a plain-path relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The target header was present but did not yield a usable destination.
    #[error("request carries no usable forwarding target")]
    InvalidTarget,

    /// The outgoing request could not be delivered or answered.
    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    /// The configured upstream deadline elapsed before a response arrived.
    #[error("upstream response timed out")]
    UpstreamTimeout,

    /// The outgoing request could not be assembled from the descriptor.
    #[error("malformed outgoing request: {0}")]
    BadOutgoingRequest(#[from] axum::http::Error),
}
