//! Application-facing side of the bridge.
//!
//! Application handlers see the same values whichever topology hosts them:
//!
//! - `ClientCertificate` extractor: the connection's client certificate, if any
//! - `Extension<Arc<BackendEnvironment>>`: the startup-time projection
//! - `request.version()`: the negotiated protocol (CoResident)
//! - `ConnectionIntent` response part: ask for the connection to be closed
//!
//! A CoResident front end installs these itself. A Proxied backend wraps
//! its router with [`into_proxied_app`], which decodes the forwarded
//! identity on the trusted hop.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{Extension, Router};

use crate::binding::BackendEnvironment;
use crate::hosting::{ClientIdentity, CLIENT_CERT_HEADER, PAIRING_TOKEN_HEADER};
use crate::observability::metrics;

/// Client certificate of the current connection. `None` means no
/// certificate, or one that could not be trusted or decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientCertificate(pub Option<ClientIdentity>);

impl<S> FromRequestParts<S> for ClientCertificate
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<ClientCertificate>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Wrap an application for hosting behind a Proxied front end.
pub fn into_proxied_app(app: Router, environment: Arc<BackendEnvironment>) -> Router {
    app.layer(middleware::from_fn_with_state(
        environment.clone(),
        accept_forwarded_identity,
    ))
    .layer(Extension(environment))
}

async fn accept_forwarded_identity(
    State(environment): State<Arc<BackendEnvironment>>,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = forwarded_identity(request.headers(), environment.pairing_token());

    let headers = request.headers_mut();
    headers.remove(CLIENT_CERT_HEADER);
    headers.remove(PAIRING_TOKEN_HEADER);
    request.extensions_mut().insert(ClientCertificate(identity));

    next.run(request).await
}

/// Decode the forwarded identity if, and only if, the hop is trusted.
///
/// Every failure degrades to `None`.
pub fn forwarded_identity(headers: &HeaderMap, expected_token: Option<&str>) -> Option<ClientIdentity> {
    let encoded = headers.get(CLIENT_CERT_HEADER)?;

    let presented = headers
        .get(PAIRING_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    let trusted = match (expected_token, presented) {
        (Some(expected), Some(presented)) => tokens_match(expected, presented),
        _ => false,
    };
    if !trusted {
        tracing::debug!("Ignoring identity header without a valid pairing token");
        metrics::record_identity_rejected("untrusted");
        return None;
    }

    match ClientIdentity::from_header_value(encoded) {
        Ok(identity) => Some(identity),
        Err(e) => {
            tracing::debug!(error = %e, "Discarding malformed identity header");
            metrics::record_identity_rejected("malformed");
            None
        }
    }
}

/// Length-independent comparison of the pairing token.
fn tokens_match(expected: &str, presented: &str) -> bool {
    let (a, b) = (expected.as_bytes(), presented.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
