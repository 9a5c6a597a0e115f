//! Plain-listener redirect behavior per bridge generation.
//!
//! `Current` answers a request on a plain listener with `307` to the https
//! equivalent whenever an https port is known. `Legacy` never redirects.
//! Both are kept: deployments depend on each.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use url::Url;

use crate::binding::ResolvedHttpsPort;
use crate::config::BridgeGeneration;
use crate::net::ConnectionInfo;
use crate::observability::metrics;

/// Decided once at startup from generation and resolved port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectPolicy {
    PassThrough,
    RedirectTo { https_port: u16 },
}

impl RedirectPolicy {
    pub fn new(generation: BridgeGeneration, resolved: ResolvedHttpsPort) -> Self {
        match (generation, resolved.port()) {
            (BridgeGeneration::Current, Some(https_port)) => RedirectPolicy::RedirectTo { https_port },
            (BridgeGeneration::Current, None) | (BridgeGeneration::Legacy, _) => {
                RedirectPolicy::PassThrough
            }
        }
    }

    /// Location to redirect a plain-listener request to, if any.
    pub fn location(&self, uri: &Uri, host_header: Option<&str>, fallback_host: &str) -> Option<String> {
        let RedirectPolicy::RedirectTo { https_port } = *self else {
            return None;
        };

        let host = host_header
            .map(strip_port)
            .filter(|h| !h.is_empty())
            .or_else(|| uri.host())
            .unwrap_or(fallback_host);

        let mut url = Url::parse(&format!("https://{}/", host)).ok()?;
        url.set_port(if https_port == 443 { None } else { Some(https_port) })
            .ok()?;
        url.set_path(uri.path());
        url.set_query(uri.query());
        Some(url.into())
    }
}

/// Host without its `:port` suffix; IPv6 literals keep their brackets.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// Middleware applying the redirect policy to plain-listener requests.
pub async fn redirect_middleware(
    State(policy): State<Arc<RedirectPolicy>>,
    request: Request,
    next: Next,
) -> Response {
    let plain_binding_host = request
        .extensions()
        .get::<Arc<ConnectionInfo>>()
        .filter(|conn| !conn.is_tls())
        .map(|conn| conn.binding().host.clone());

    if let Some(fallback_host) = plain_binding_host {
        let host_header = request
            .headers()
            .get(header::HOST)
            .and_then(|v| v.to_str().ok());
        if let Some(location) = policy.location(request.uri(), host_header, &fallback_host) {
            tracing::debug!(location = %location, method = %request.method(), "Redirecting to https");
            metrics::record_redirect();
            return Redirect::temporary(&location).into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    #[test]
    fn current_with_port_redirects() {
        let policy = RedirectPolicy::new(
            BridgeGeneration::Current,
            ResolvedHttpsPort::Unambiguous(5001),
        );
        assert_eq!(policy, RedirectPolicy::RedirectTo { https_port: 5001 });
        assert_eq!(
            policy.location(&uri("/path"), Some("host:8080"), "localhost").as_deref(),
            Some("https://host:5001/path")
        );
    }

    #[test]
    fn legacy_never_redirects() {
        for resolved in [
            ResolvedHttpsPort::Unambiguous(5001),
            ResolvedHttpsPort::Overridden(5001),
            ResolvedHttpsPort::Ambiguous,
        ] {
            let policy = RedirectPolicy::new(BridgeGeneration::Legacy, resolved);
            assert_eq!(policy, RedirectPolicy::PassThrough);
            assert!(policy.location(&uri("/path"), Some("host"), "localhost").is_none());
        }
    }

    #[test]
    fn current_without_port_passes_through() {
        let policy = RedirectPolicy::new(BridgeGeneration::Current, ResolvedHttpsPort::Ambiguous);
        assert_eq!(policy, RedirectPolicy::PassThrough);
    }

    #[test]
    fn override_port_is_used() {
        let policy = RedirectPolicy::new(BridgeGeneration::Current, ResolvedHttpsPort::Overridden(123));
        assert_eq!(
            policy.location(&uri("/a?b=c"), Some("example.com"), "localhost").as_deref(),
            Some("https://example.com:123/a?b=c")
        );
    }

    #[test]
    fn default_port_is_omitted() {
        let policy = RedirectPolicy::RedirectTo { https_port: 443 };
        assert_eq!(
            policy.location(&uri("/"), Some("example.com:80"), "localhost").as_deref(),
            Some("https://example.com/")
        );
    }

    #[test]
    fn host_falls_back_to_binding() {
        let policy = RedirectPolicy::RedirectTo { https_port: 5001 };
        assert_eq!(
            policy.location(&uri("/x"), None, "localhost").as_deref(),
            Some("https://localhost:5001/x")
        );
    }

    #[test]
    fn ipv6_host_keeps_brackets() {
        assert_eq!(strip_port("[::1]:8080"), "[::1]");
        assert_eq!(strip_port("[::1]"), "[::1]");
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");

        let policy = RedirectPolicy::RedirectTo { https_port: 5001 };
        assert_eq!(
            policy.location(&uri("/"), Some("[::1]:8080"), "localhost").as_deref(),
            Some("https://[::1]:5001/")
        );
    }
}
