//! Proxied topology: the application runs in a separate process.
//!
//! # Responsibilities
//! - Forward requests over the loopback hop with a pooled HTTP/1.1 client
//! - Carry the client certificate and pairing token as request headers
//! - Never forward identity headers that arrived from the client itself
//! - Apply the `Connection` header policy to forwarded responses

use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{self, InvalidHeaderValue};
use axum::http::uri::{Authority, InvalidUri, PathAndQuery, Scheme};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request, StatusCode, Uri, Version};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::TopologyMode;
use crate::hosting::connection::{strip_hop_by_hop, ConnectionHeaderPolicy};
use crate::hosting::identity::{CLIENT_CERT_HEADER, PAIRING_TOKEN_HEADER};
use crate::hosting::HostingModel;
use crate::net::ConnectionInfo;
use crate::observability::metrics;

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid backend address: {0}")]
    Authority(#[from] InvalidUri),
    #[error("pairing token is not a valid header value")]
    Token(#[from] InvalidHeaderValue),
}

/// Loopback forwarding to a backend process.
#[derive(Clone)]
pub struct Proxied {
    client: Client<HttpConnector, Body>,
    upstream: Authority,
    pairing_token: HeaderValue,
    policy: ConnectionHeaderPolicy,
}

impl Proxied {
    pub fn new(
        upstream: SocketAddr,
        pairing_token: &str,
        policy: ConnectionHeaderPolicy,
        connect_timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);

        Ok(Self {
            client,
            upstream: Authority::from_str(&upstream.to_string())?,
            pairing_token: HeaderValue::from_str(pairing_token)?,
            policy,
        })
    }

    pub fn policy(&self) -> ConnectionHeaderPolicy {
        self.policy
    }

    fn upstream_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.upstream.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

/// The front end faces clients directly, so any x-forwarded-for they send
/// is untrusted and replaced by the peer address.
fn set_forwarded_for(headers: &mut HeaderMap, peer: IpAddr) {
    if let Ok(value) = HeaderValue::from_str(&peer.to_string()) {
        headers.insert(X_FORWARDED_FOR, value);
    }
}

impl HostingModel for Proxied {
    fn topology(&self) -> TopologyMode {
        TopologyMode::Proxied
    }

    fn attach_identity(&self, request: &mut Request<Body>, connection: &ConnectionInfo) {
        let headers = request.headers_mut();
        if headers.remove(CLIENT_CERT_HEADER).is_some() {
            tracing::debug!(
                connection_id = %connection.id(),
                "Dropped client-supplied identity header"
            );
        }
        headers.remove(PAIRING_TOKEN_HEADER);

        if let Some(identity) = connection.client_identity() {
            match identity.to_header_value() {
                Some(value) => {
                    headers.insert(CLIENT_CERT_HEADER, value);
                }
                None => tracing::warn!(
                    connection_id = %connection.id(),
                    "Client certificate could not be encoded; forwarding without it"
                ),
            }
        }
        headers.insert(PAIRING_TOKEN_HEADER, self.pairing_token.clone());
    }

    fn negotiate_protocol(&self, request: &mut Request<Body>) {
        *request.version_mut() = Version::HTTP_11;
    }

    fn forward<'a>(
        &'a self,
        request: Request<Body>,
        connection: &'a ConnectionInfo,
    ) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let (mut parts, body) = request.into_parts();

            strip_hop_by_hop(&mut parts.headers);
            if !parts.headers.contains_key(header::HOST) {
                let host = parts
                    .uri
                    .authority()
                    .and_then(|a| HeaderValue::from_str(a.as_str()).ok());
                if let Some(host) = host {
                    parts.headers.insert(header::HOST, host);
                }
            }
            set_forwarded_for(&mut parts.headers, connection.peer_addr().ip());
            parts
                .headers
                .insert(X_FORWARDED_PROTO, HeaderValue::from_static(connection.scheme()));

            parts.uri = match self.upstream_uri(&parts.uri) {
                Ok(uri) => uri,
                Err(e) => {
                    tracing::warn!(error = %e, "Could not build upstream URI");
                    return (StatusCode::BAD_REQUEST, "Bad request").into_response();
                }
            };

            match self.client.request(Request::from_parts(parts, body)).await {
                Ok(response) => {
                    let (parts, body) = response.into_parts();
                    Response::from_parts(parts, Body::new(body))
                }
                Err(e) => {
                    tracing::error!(
                        connection_id = %connection.id(),
                        upstream = %self.upstream,
                        error = %e,
                        "Upstream error"
                    );
                    metrics::record_upstream_error();
                    (StatusCode::BAD_GATEWAY, "Upstream request failed").into_response()
                }
            }
        })
    }

    fn finish_response(&self, response: &mut Response) {
        self.policy.filter_forwarded(response.headers_mut());
    }
}
