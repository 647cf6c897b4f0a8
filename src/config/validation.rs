//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the target header is a usable, non-reserved header name
//! - Validate addresses and value ranges
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::header::HeaderName;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// Headers the forwarding engine manages itself; using one of these as the
/// target header would mangle every forwarded request.
const RESERVED_TARGET_HEADERS: &[&str] = &[
    "host",
    "connection",
    "upgrade",
    "content-length",
    "transfer-encoding",
];

/// A single semantic validation failure.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid metrics address '{0}'")]
    InvalidMetricsAddress(String),

    #[error("invalid target header name '{0}'")]
    InvalidTargetHeader(String),

    #[error("target header '{0}' is reserved for the forwarding engine")]
    ReservedTargetHeader(String),

    #[error("cookie rewrite table contains an empty domain key")]
    EmptyCookieDomain,

    #[error("max_connections must be greater than zero")]
    ZeroConnectionLimit,
}

/// Validate a configuration, collecting every failure.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroConnectionLimit);
    }

    let target = &config.forward.target_header;
    if HeaderName::from_bytes(target.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidTargetHeader(target.clone()));
    } else if RESERVED_TARGET_HEADERS
        .iter()
        .any(|reserved| target.eq_ignore_ascii_case(reserved))
    {
        errors.push(ValidationError::ReservedTargetHeader(target.clone()));
    }

    if config
        .forward
        .cookie_domain_rewrite
        .keys()
        .any(|domain| domain.is_empty())
    {
        errors.push(ValidationError::EmptyCookieDomain);
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ProxyConfig::default()).is_ok());
    }

    #[test]
    fn rejects_invalid_target_header() {
        let mut config = ProxyConfig::default();
        config.forward.target_header = "not a header".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::InvalidTargetHeader(_)
        ));
    }

    #[test]
    fn rejects_reserved_target_header() {
        let mut config = ProxyConfig::default();
        config.forward.target_header = "Host".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(
            errors[0],
            ValidationError::ReservedTargetHeader(_)
        ));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.listener.max_connections = 0;
        config
            .forward
            .cookie_domain_rewrite
            .insert(String::new(), "b.com".to_string());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }
}
