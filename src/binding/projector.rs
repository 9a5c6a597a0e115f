//! Environment projection for the backend.
//!
//! The projection is the only channel through which startup-time facts
//! (https port, internal port, pairing token, public addresses) reach the
//! backend. It is computed once and is immutable afterwards: a Proxied
//! backend receives it as its process environment, a CoResident one as a
//! shared request extension.

use std::collections::BTreeMap;

use crate::binding::{Binding, ResolvedHttpsPort};

/// Resolved https port, also the operator override key.
pub const HTTPS_PORT: &str = "BRIDGE_HTTPS_PORT";
/// Internal port a Proxied backend must listen on.
pub const PORT: &str = "BRIDGE_PORT";
/// Shared secret authenticating the front end on the internal hop.
pub const PAIRING_TOKEN: &str = "BRIDGE_TOKEN";
/// Public base addresses of the application, `;` separated.
pub const SERVER_ADDRESSES: &str = "BRIDGE_SERVER_ADDRESSES";

/// Keys only the projection may set. A launched backend never inherits
/// them from the front end's own environment.
pub const RESERVED: [&str; 4] = [HTTPS_PORT, PORT, PAIRING_TOKEN, SERVER_ADDRESSES];

/// Operator override that is not a valid port number.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("BRIDGE_HTTPS_PORT must be a port number, got {value:?}")]
pub struct InvalidOverride {
    pub value: String,
}

/// Read the operator's https port override from the backend environment table.
pub fn operator_override(
    environment: &BTreeMap<String, String>,
) -> Result<Option<u16>, InvalidOverride> {
    match environment.get(HTTPS_PORT) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u16>()
            .map(Some)
            .map_err(|_| InvalidOverride {
                value: value.clone(),
            }),
    }
}

/// Key/value environment seen by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendEnvironment {
    vars: BTreeMap<String, String>,
}

impl BackendEnvironment {
    /// Project the resolved port on top of the operator's environment.
    ///
    /// `Ambiguous` leaves the signal absent; the backend must treat the
    /// absence as "port unknown".
    pub fn project(resolved: ResolvedHttpsPort, operator: &BTreeMap<String, String>) -> Self {
        let mut vars = operator.clone();
        match resolved.port() {
            Some(port) => {
                vars.insert(HTTPS_PORT.to_string(), port.to_string());
            }
            None => {
                vars.remove(HTTPS_PORT);
            }
        }
        Self { vars }
    }

    /// Snapshot the current process environment (Proxied backends).
    pub fn from_process_env() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Add a bridge-owned entry.
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.insert(key.to_string(), value.into());
        self
    }

    /// Add the public base addresses of every binding.
    pub fn with_server_addresses(self, bindings: &[Binding], app_path: &str) -> Self {
        let addresses: Vec<String> = bindings.iter().map(|b| b.base_address(app_path)).collect();
        if addresses.is_empty() {
            return self;
        }
        self.with(SERVER_ADDRESSES, addresses.join(";"))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn https_port(&self) -> Option<u16> {
        self.get(HTTPS_PORT).and_then(|v| v.parse().ok())
    }

    pub fn pairing_token(&self) -> Option<&str> {
        self.get(PAIRING_TOKEN)
    }

    pub fn server_addresses(&self) -> Vec<&str> {
        self.get(SERVER_ADDRESSES)
            .map(|v| v.split(';').filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }

    /// Bridge-owned entries only (`BRIDGE_*`), pairing token excluded.
    pub fn bridge_entries(&self) -> BTreeMap<&str, &str> {
        self.vars
            .iter()
            .filter(|(k, _)| k.starts_with("BRIDGE_") && k.as_str() != PAIRING_TOKEN)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
