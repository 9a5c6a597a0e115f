//! Diagnostics application for a proxied front end.
//!
//! Reads the projected environment from its own process environment and
//! listens on loopback `BRIDGE_PORT` (default 5000).

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use hosting_bridge::app::diagnostics_router;
use hosting_bridge::backend::into_proxied_app;
use hosting_bridge::binding::projector::PORT;
use hosting_bridge::binding::BackendEnvironment;
use hosting_bridge::observability::logging;

const DEFAULT_PORT: u16 = 5000;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init("info");

    let environment = Arc::new(BackendEnvironment::from_process_env());
    let port = match environment.get(PORT) {
        Some(value) => value.parse::<u16>()?,
        None => DEFAULT_PORT,
    };
    if environment.pairing_token().is_none() {
        tracing::warn!("No pairing token in environment; forwarded client certificates will be ignored");
    }

    let app = into_proxied_app(diagnostics_router(), environment);
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, "Diagnostics app listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(hosting_bridge::lifecycle::shutdown_signal())
        .await?;
    Ok(())
}
