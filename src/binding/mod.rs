//! Listener bindings and the startup-time signals derived from them.
//!
//! # Data Flow
//! ```text
//! config.bindings (ordered, read-only)
//!     → resolver.rs (distinct https ports → ResolvedHttpsPort)
//!     → operator override (explicit value always wins)
//!     → projector.rs (key/value environment for the backend)
//!     → handed to the backend exactly once, before the first request
//! ```
//!
//! # Design Decisions
//! - Ambiguity is a state, never an error and never a guess
//! - Resolution is pure; calling it twice on the same bindings is identical

pub mod projector;
pub mod resolver;

use serde::{Deserialize, Serialize};

pub use projector::BackendEnvironment;
pub use resolver::{resolve_https_port, resolve_with_override, ResolvedHttpsPort};

/// Listener protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// A configured (protocol, port, host) triple the front end listens on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Binding {
    pub protocol: Protocol,
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

impl Binding {
    pub fn new(protocol: Protocol, port: u16, host: impl Into<String>) -> Self {
        Self {
            protocol,
            port,
            host: host.into(),
        }
    }

    pub fn http(port: u16) -> Self {
        Self::new(Protocol::Http, port, default_host())
    }

    pub fn https(port: u16) -> Self {
        Self::new(Protocol::Https, port, default_host())
    }

    pub fn is_https(&self) -> bool {
        self.protocol == Protocol::Https
    }

    /// Public base address of an application mounted at `app_path`.
    pub fn base_address(&self, app_path: &str) -> String {
        let path = app_path.trim_end_matches('/');
        format!("{}://{}:{}{}", self.protocol.scheme(), self.host, self.port, path)
    }
}

impl std::fmt::Display for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://{}:{}", self.protocol.scheme(), self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_address_includes_application_path() {
        let binding = Binding::https(44301);
        assert_eq!(binding.base_address("/"), "https://localhost:44301");
        assert_eq!(binding.base_address("/shop/"), "https://localhost:44301/shop");
        assert_eq!(
            Binding::new(Protocol::Http, 8080, "example.com").base_address("/Приложение"),
            "http://example.com:8080/Приложение"
        );
    }
}
