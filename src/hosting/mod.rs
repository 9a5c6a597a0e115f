//! Hosting topologies.
//!
//! # Data Flow
//! ```text
//! request (after quirk layer) + ConnectionInfo
//!     → attach_identity     (client certificate → extension | forwarded header)
//!     → negotiate_protocol  (keep negotiated version | downgrade internal hop)
//!     → forward             (in-process Router | loopback HTTP client)
//!     → finish_response     (Connection header policy)
//!     → client
//! ```
//!
//! # Design Decisions
//! - One strategy object per process, chosen at startup; request handling
//!   never branches on topology
//! - Every operation only touches the request/connection it was given

pub mod co_resident;
pub mod connection;
pub mod identity;
pub mod proxied;

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::config::TopologyMode;
use crate::net::ConnectionInfo;
use crate::observability::metrics;

pub use co_resident::CoResident;
pub use connection::{ConnectionHeaderPolicy, ConnectionIntent};
pub use identity::{ClientIdentity, CLIENT_CERT_HEADER, PAIRING_TOKEN_HEADER};
pub use proxied::Proxied;

/// Topology-specific behavior of the bridge.
pub trait HostingModel: Send + Sync + 'static {
    fn topology(&self) -> TopologyMode;

    /// Make the connection's client certificate visible to the application.
    fn attach_identity(&self, request: &mut Request<Body>, connection: &ConnectionInfo);

    /// Decide which HTTP version the application observes.
    fn negotiate_protocol(&self, request: &mut Request<Body>);

    /// Hand the request to the application.
    fn forward<'a>(
        &'a self,
        request: Request<Body>,
        connection: &'a ConnectionInfo,
    ) -> BoxFuture<'a, Response>;

    /// Post-process the application's response for the client-facing hop.
    fn finish_response(&self, response: &mut Response);
}

/// Shared handle to the process-wide strategy.
pub type SharedHostingModel = Arc<dyn HostingModel>;

/// Run one request through a hosting strategy.
pub async fn dispatch(
    model: &dyn HostingModel,
    mut request: Request<Body>,
    connection: &ConnectionInfo,
) -> Response {
    if connection.client_identity().is_some() {
        metrics::record_client_certificate(model.topology());
    }

    model.attach_identity(&mut request, connection);
    model.negotiate_protocol(&mut request);

    let mut response = model.forward(request, connection).await;
    model.finish_response(&mut response);

    tracing::debug!(
        connection_id = %connection.id(),
        topology = %model.topology(),
        status = %response.status(),
        "Request dispatched"
    );
    response
}
