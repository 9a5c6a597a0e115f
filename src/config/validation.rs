//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Make sure topology, port and TLS state are fully defined before startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::{IpAddr, SocketAddr};

use crate::binding::projector::{operator_override, InvalidOverride};
use crate::config::schema::{BridgeConfig, TopologyMode};

/// A semantic problem in an otherwise well-formed configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("no bindings configured")]
    NoBindings,

    #[error("port {port} is bound as both http and https")]
    ConflictingBinding { port: u16 },

    #[error("https bindings require a [tls] section")]
    MissingTls,

    #[error(transparent)]
    InvalidOverride(#[from] InvalidOverride),

    #[error("proxied topology requires backend.address")]
    MissingBackendAddress,

    #[error("backend.address {0:?} is not a socket address")]
    InvalidBackendAddress(String),

    #[error("listener.bind_ip {0:?} is not an IP address")]
    InvalidBindIp(String),

    #[error("application.path {0:?} must start with '/'")]
    InvalidApplicationPath(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.bindings.is_empty() {
        errors.push(ValidationError::NoBindings);
    }

    for (i, a) in config.bindings.iter().enumerate() {
        let conflict = config.bindings[..i]
            .iter()
            .any(|b| b.port == a.port && b.protocol != a.protocol);
        if conflict {
            errors.push(ValidationError::ConflictingBinding { port: a.port });
        }
    }

    if config.bindings.iter().any(|b| b.is_https()) && config.tls.is_none() {
        errors.push(ValidationError::MissingTls);
    }

    if let Err(e) = operator_override(&config.backend.environment) {
        errors.push(e.into());
    }

    if config.topology == TopologyMode::Proxied {
        match config.backend.address.as_deref() {
            None => errors.push(ValidationError::MissingBackendAddress),
            Some(addr) if addr.parse::<SocketAddr>().is_err() => {
                errors.push(ValidationError::InvalidBackendAddress(addr.to_string()))
            }
            Some(_) => {}
        }
    }

    if config.listener.bind_ip.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidBindIp(config.listener.bind_ip.clone()));
    }

    if !config.application.path.starts_with('/') {
        errors.push(ValidationError::InvalidApplicationPath(
            config.application.path.clone(),
        ));
    }

    if config.listener.max_connections == 0 {
        errors.push(ValidationError::Zero("listener.max_connections"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.connect_secs"));
    }
    if config.timeouts.tls_handshake_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.tls_handshake_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
