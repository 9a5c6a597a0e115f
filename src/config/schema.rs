//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bridge.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::binding::Binding;

/// Root configuration for the hosting bridge.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// Where the application runs relative to the front end.
    pub topology: TopologyMode,

    /// Which generation of redirect behavior is active.
    pub generation: BridgeGeneration,

    /// Application mounted by this front end.
    pub application: ApplicationConfig,

    /// Listeners the front end accepts on, in configured order.
    pub bindings: Vec<Binding>,

    /// Socket settings shared by every binding.
    pub listener: ListenerConfig,

    /// TLS material for https bindings.
    pub tls: Option<TlsConfig>,

    /// Request handler quirks.
    pub handler: HandlerConfig,

    /// Backend process settings (Proxied topology).
    pub backend: BackendConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Hosting topology, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TopologyMode {
    /// The application runs inside the front end's process.
    CoResident,
    /// The application runs in a separate process behind a loopback hop.
    #[default]
    Proxied,
}

impl TopologyMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TopologyMode::CoResident => "co-resident",
            TopologyMode::Proxied => "proxied",
        }
    }
}

impl std::fmt::Display for TopologyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bridge generation, selecting the plain-listener redirect behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BridgeGeneration {
    /// Plain-listener requests pass through unmodified.
    Legacy,
    /// Plain-listener requests are redirected to https when a port is known.
    #[default]
    Current,
}

/// Application settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Virtual directory the application is mounted under (e.g. "/shop").
    pub path: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            path: "/".to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// IP address every binding port is bound on.
    pub bind_ip: String,

    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_ip: "0.0.0.0".to_string(),
            max_connections: 10_000,
        }
    }
}

/// TLS configuration for https listeners.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Trust roots for client certificates (PEM). When set, clients may
    /// offer a certificate; it is never required.
    #[serde(default)]
    pub client_ca_path: Option<String>,
}

/// Request handler settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HandlerConfig {
    /// Propagate the backend's `Connection` header to clients (Proxied only).
    pub forward_response_connection_header: bool,
}

/// Backend process configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Loopback address the backend listens on (e.g., "127.0.0.1:5000").
    pub address: Option<String>,

    /// Executable to launch. When unset the backend is started externally.
    pub command: Option<String>,

    /// Arguments passed to `command`.
    pub args: Vec<String>,

    /// Operator-supplied environment for the backend.
    pub environment: BTreeMap<String, String>,

    /// How long to wait for a launched backend to accept connections.
    pub startup_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            address: None,
            command: None,
            args: Vec::new(),
            environment: BTreeMap::new(),
            startup_timeout_secs: 10,
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout to the backend in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Time a client has to complete the TLS handshake, in seconds.
    pub tls_handshake_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            tls_handshake_secs: 10,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Protocol;

    #[test]
    fn parses_full_document() {
        let doc = r#"
            topology = "co-resident"
            generation = "legacy"

            [application]
            path = "/shop"

            [[bindings]]
            protocol = "https"
            port = 44301
            host = "localhost"

            [[bindings]]
            protocol = "http"
            port = 8080

            [handler]
            forward_response_connection_header = true

            [backend.environment]
            BRIDGE_HTTPS_PORT = "123"
        "#;

        let config: BridgeConfig = toml::from_str(doc).unwrap();
        assert_eq!(config.topology, TopologyMode::CoResident);
        assert_eq!(config.generation, BridgeGeneration::Legacy);
        assert_eq!(config.application.path, "/shop");
        assert_eq!(config.bindings.len(), 2);
        assert_eq!(config.bindings[0].protocol, Protocol::Https);
        assert_eq!(config.bindings[1].host, "localhost");
        assert!(config.handler.forward_response_connection_header);
        assert_eq!(config.backend.environment["BRIDGE_HTTPS_PORT"], "123");
        assert_eq!(config.backend.startup_timeout_secs, 10);
    }

    #[test]
    fn defaults_are_proxied_current() {
        let config: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(config.topology, TopologyMode::Proxied);
        assert_eq!(config.generation, BridgeGeneration::Current);
        assert!(config.bindings.is_empty());
        assert!(!config.handler.forward_response_connection_header);
    }
}
