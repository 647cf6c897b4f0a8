//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Root configuration for the forwarding proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, connection limits).
    pub listener: ListenerConfig,

    /// Forwarding engine settings.
    pub forward: ForwardConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            max_connections: 10_000,
        }
    }
}

/// Forwarding engine configuration.
///
/// Every inbound request names its own destination through the target header,
/// so there is no backend list here; the only routing state is the header
/// name and a handful of response-shaping knobs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ForwardConfig {
    /// Header carrying the absolute destination URL for each request.
    pub target_header: String,

    /// Body written for plain requests that carry no target header.
    /// Such requests are deliberately not forwarded anywhere.
    pub fallback_body: String,

    /// Operational paths answered with a fixed 404 before any forwarding.
    pub reserved_paths: Vec<String>,

    /// Upstream response deadline in seconds. `None` disables the deadline,
    /// which is the default: forwarded connections may legitimately idle.
    pub upstream_timeout_secs: Option<u64>,

    /// `set-cookie` domain rewrite table: previous domain → replacement.
    /// A `"*"` key matches any domain not listed; an empty replacement
    /// strips the `domain=` attribute entirely.
    pub cookie_domain_rewrite: HashMap<String, String>,
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            target_header: "x-forwarded-url".to_string(),
            fallback_body: "Hello World".to_string(),
            reserved_paths: vec!["/1.1/functions/_ops/metadatas".to_string()],
            upstream_timeout_secs: None,
            cookie_domain_rewrite: HashMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter (e.g. "forward_proxy=debug").
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "forward_proxy=info,tower_http=info".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
