//! Close intent and the response `Connection` header policy.
//!
//! # Behavior
//! ```text
//! CoResident              → application headers reach hyper untouched
//! Proxied + Default       → Connection (and other hop-by-hop) stripped
//! Proxied + ForceForward  → `Connection: close` re-applied if the backend asked
//! ```
//!
//! The three-way split is a compatibility contract with deployed clients.

use std::convert::Infallible;

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use axum::response::{IntoResponseParts, ResponseParts};

use crate::config::TopologyMode;

/// Headers that only describe the hop they travel on.
const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Application-set request to not reuse the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionIntent {
    #[default]
    Unset,
    RequestClose,
}

impl ConnectionIntent {
    /// Read the intent carried by a set of response headers.
    pub fn of(headers: &HeaderMap) -> Self {
        let close = headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("close"));
        if close {
            ConnectionIntent::RequestClose
        } else {
            ConnectionIntent::Unset
        }
    }

    pub fn apply(self, headers: &mut HeaderMap) {
        if self == ConnectionIntent::RequestClose {
            headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
        }
    }
}

impl IntoResponseParts for ConnectionIntent {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        self.apply(res.headers_mut());
        Ok(res)
    }
}

/// How a Proxied front end treats the backend's `Connection` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionHeaderPolicy {
    #[default]
    Default,
    ForceForward,
}

impl ConnectionHeaderPolicy {
    /// Fixed once at startup. CoResident never leaves `Default`.
    pub fn from_config(topology: TopologyMode, forward_response_connection_header: bool) -> Self {
        match (topology, forward_response_connection_header) {
            (TopologyMode::Proxied, true) => ConnectionHeaderPolicy::ForceForward,
            _ => ConnectionHeaderPolicy::Default,
        }
    }

    /// Rewrite a forwarded response's headers for the client-facing hop.
    pub fn filter_forwarded(&self, headers: &mut HeaderMap) {
        let intent = ConnectionIntent::of(headers);
        strip_hop_by_hop(headers);

        if *self == ConnectionHeaderPolicy::ForceForward {
            intent.apply(headers);
        }
    }
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
}
