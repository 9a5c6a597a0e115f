//! CoResident topology: the application runs inside the front end.
//!
//! There is no serialization boundary. The client certificate is handed
//! over as a request extension, the HTTP version is exactly what hyper
//! negotiated on the client connection, and the response goes back to
//! hyper untouched, so hyper itself acts on `Connection: close`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;
use axum::{Extension, Router};
use futures_util::future::BoxFuture;
use tower::ServiceExt;

use crate::backend::ClientCertificate;
use crate::binding::BackendEnvironment;
use crate::config::TopologyMode;
use crate::hosting::HostingModel;
use crate::net::ConnectionInfo;

/// In-process hosting of an axum application.
#[derive(Clone)]
pub struct CoResident {
    app: Router,
}

impl CoResident {
    /// Mount `app`, exposing the projected environment as an extension.
    pub fn new(app: Router, environment: Arc<BackendEnvironment>) -> Self {
        Self {
            app: app.layer(Extension(environment)),
        }
    }
}

impl HostingModel for CoResident {
    fn topology(&self) -> TopologyMode {
        TopologyMode::CoResident
    }

    fn attach_identity(&self, request: &mut Request<Body>, connection: &ConnectionInfo) {
        request
            .extensions_mut()
            .insert(ClientCertificate(connection.client_identity().cloned()));
    }

    fn negotiate_protocol(&self, request: &mut Request<Body>) {
        // Passthrough: the application reads the version hyper negotiated.
        tracing::trace!(version = ?request.version(), "Protocol passed through");
    }

    fn forward<'a>(
        &'a self,
        request: Request<Body>,
        _connection: &'a ConnectionInfo,
    ) -> BoxFuture<'a, Response> {
        let app = self.app.clone();
        Box::pin(async move {
            match app.oneshot(request).await {
                Ok(response) => response,
                Err(never) => match never {},
            }
        })
    }

    fn finish_response(&self, _response: &mut Response) {}
}
