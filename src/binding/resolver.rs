//! HTTPS port resolution.
//!
//! # Responsibilities
//! - Attribute a single externally-visible https port to the application
//! - Refuse to pick one when the bindings disagree
//! - Let an explicit operator value take precedence over inference

use std::collections::BTreeSet;

use crate::binding::Binding;

/// Outcome of https port resolution. Computed once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedHttpsPort {
    /// Exactly one distinct https port is bound.
    Unambiguous(u16),
    /// Zero or several distinct https ports are bound.
    Ambiguous,
    /// The operator supplied the port explicitly.
    Overridden(u16),
}

impl ResolvedHttpsPort {
    /// The port to advertise, if any.
    pub fn port(&self) -> Option<u16> {
        match self {
            ResolvedHttpsPort::Unambiguous(port) | ResolvedHttpsPort::Overridden(port) => {
                Some(*port)
            }
            ResolvedHttpsPort::Ambiguous => None,
        }
    }
}

impl std::fmt::Display for ResolvedHttpsPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedHttpsPort::Unambiguous(port) => write!(f, "{}", port),
            ResolvedHttpsPort::Overridden(port) => write!(f, "{} (override)", port),
            ResolvedHttpsPort::Ambiguous => f.write_str("ambiguous"),
        }
    }
}

/// Resolve the https port from the configured bindings alone.
///
/// Duplicate bindings on the same port (e.g. two host names) count once.
pub fn resolve_https_port(bindings: &[Binding]) -> ResolvedHttpsPort {
    let ports: BTreeSet<u16> = bindings
        .iter()
        .filter(|b| b.is_https())
        .map(|b| b.port)
        .collect();

    let mut iter = ports.into_iter();
    match (iter.next(), iter.next()) {
        (Some(port), None) => ResolvedHttpsPort::Unambiguous(port),
        _ => ResolvedHttpsPort::Ambiguous,
    }
}

/// Resolve the https port, honoring an operator override unconditionally.
pub fn resolve_with_override(bindings: &[Binding], operator: Option<u16>) -> ResolvedHttpsPort {
    match operator {
        Some(port) => ResolvedHttpsPort::Overridden(port),
        None => resolve_https_port(bindings),
    }
}
