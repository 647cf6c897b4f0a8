//! Runtime forwarding options resolved from configuration.

use std::collections::HashMap;
use std::time::Duration;

use axum::http::header::HeaderName;

use crate::config::loader::ConfigError;
use crate::config::schema::ForwardConfig;
use crate::config::validation::ValidationError;

/// Read-only forwarding options shared by every relay.
///
/// Resolved once at server construction from [`ForwardConfig`]; relays only
/// ever read it through an `Arc`.
#[derive(Debug, Clone)]
pub struct ForwardOptions {
    /// Header naming the destination of each request.
    pub target_header: HeaderName,

    /// Body answered for plain requests without a target header.
    pub fallback_body: String,

    /// Paths answered with a fixed 404 before any forwarding.
    pub reserved_paths: Vec<String>,

    /// Deadline for the upstream response on the plain path.
    pub upstream_timeout: Option<Duration>,

    /// `set-cookie` domain rewrite table, if configured.
    pub cookie_domain_rewrite: Option<HashMap<String, String>>,
}

impl ForwardOptions {
    /// Resolve options from validated configuration.
    pub fn from_config(config: &ForwardConfig) -> Result<Self, ConfigError> {
        let target_header =
            HeaderName::from_bytes(config.target_header.as_bytes()).map_err(|_| {
                ConfigError::Validation(vec![ValidationError::InvalidTargetHeader(
                    config.target_header.clone(),
                )])
            })?;

        let cookie_domain_rewrite = if config.cookie_domain_rewrite.is_empty() {
            None
        } else {
            Some(config.cookie_domain_rewrite.clone())
        };

        Ok(Self {
            target_header,
            fallback_body: config.fallback_body.clone(),
            reserved_paths: config.reserved_paths.clone(),
            upstream_timeout: config.upstream_timeout_secs.map(Duration::from_secs),
            cookie_domain_rewrite,
        })
    }
}

impl Default for ForwardOptions {
    fn default() -> Self {
        Self::from_config(&ForwardConfig::default())
            .expect("default forward configuration is valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_default_config() {
        let options = ForwardOptions::default();
        assert_eq!(options.target_header.as_str(), "x-forwarded-url");
        assert_eq!(options.fallback_body, "Hello World");
        assert!(options.upstream_timeout.is_none());
        assert!(options.cookie_domain_rewrite.is_none());
    }

    #[test]
    fn rejects_unusable_target_header() {
        let mut config = ForwardConfig::default();
        config.target_header = "bad header".to_string();
        assert!(ForwardOptions::from_config(&config).is_err());
    }
}
