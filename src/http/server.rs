//! Front-end server setup.
//!
//! # Responsibilities
//! - Bind one listener per binding port, TLS on https bindings
//! - Serve HTTP/1.1 and HTTP/2 on every connection
//! - Attach `ConnectionInfo` to each request
//! - Wire up middleware (request ID, tracing, timeout, redirect quirk)
//! - Dispatch requests to the hosting strategy chosen at startup
//! - Drain open connections on shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::binding::Binding;
use crate::config::{BridgeConfig, TopologyMode};
use crate::hosting::proxied::UpstreamError;
use crate::hosting::{self, CoResident, Proxied, SharedHostingModel};
use crate::http::request::strip_application_path;
use crate::lifecycle::{BridgeSettings, Shutdown};
use crate::net::listener::{listener_plan, ConnectionPermit};
use crate::net::tls::{build_acceptor, session_of, TlsError, TlsMaterial};
use crate::net::{ConnectionGuard, ConnectionInfo, ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;
use crate::quirks::{redirect_middleware, RedirectPolicy};

/// How long open connections may keep running after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FrontEndError {
    #[error("co-resident topology requires an application")]
    MissingApplication,
    #[error("proxied topology requires a backend address")]
    MissingBackendAddress,
    #[error("https bindings require TLS material")]
    MissingTls,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// State injected into the bridge handler.
#[derive(Clone)]
struct BridgeState {
    model: SharedHostingModel,
    application_path: Arc<str>,
}

/// The TLS-terminating front end.
pub struct FrontEnd {
    config: BridgeConfig,
    topology: TopologyMode,
    router: Router,
    tracker: ConnectionTracker,
}

impl FrontEnd {
    /// Build the front end. `app` is the in-process application and is
    /// required for the co-resident topology only.
    pub fn new(
        config: BridgeConfig,
        settings: &BridgeSettings,
        app: Option<Router>,
    ) -> Result<Self, FrontEndError> {
        let model: SharedHostingModel = match settings.topology {
            TopologyMode::CoResident => {
                let app = app.ok_or(FrontEndError::MissingApplication)?;
                Arc::new(CoResident::new(app, settings.environment.clone()))
            }
            TopologyMode::Proxied => {
                if app.is_some() {
                    tracing::warn!("Ignoring in-process application in proxied topology");
                }
                let upstream = settings
                    .backend_address
                    .ok_or(FrontEndError::MissingBackendAddress)?;
                Arc::new(Proxied::new(
                    upstream,
                    &settings.pairing_token,
                    settings.header_policy,
                    Duration::from_secs(config.timeouts.connect_secs),
                )?)
            }
        };

        let redirect = RedirectPolicy::new(settings.generation, settings.https_port);
        tracing::info!(
            topology = %settings.topology,
            generation = ?settings.generation,
            redirect = ?redirect,
            header_policy = ?settings.header_policy,
            "Front end configured"
        );

        let state = BridgeState {
            model,
            application_path: Arc::from(settings.application_path.as_str()),
        };
        let router = Self::build_router(&config, state, redirect);

        Ok(Self {
            topology: settings.topology,
            config,
            router,
            tracker: ConnectionTracker::new(),
        })
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &BridgeConfig, state: BridgeState, redirect: RedirectPolicy) -> Router {
        Router::new()
            .fallback(bridge_handler)
            .with_state(state)
            .layer(middleware::from_fn_with_state(
                Arc::new(redirect),
                redirect_middleware,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    /// The request pipeline, expecting `Arc<ConnectionInfo>` in extensions.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn topology(&self) -> TopologyMode {
        self.topology
    }

    /// Bind every listener, then serve until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) -> Result<(), FrontEndError> {
        let plan = listener_plan(&self.config.bindings);

        let acceptor = if plan.iter().any(Binding::is_https) {
            let tls = self.config.tls.as_ref().ok_or(FrontEndError::MissingTls)?;
            Some(build_acceptor(TlsMaterial::load(tls)?)?)
        } else {
            None
        };

        // Bind everything before serving anything.
        let mut listeners = Vec::with_capacity(plan.len());
        for binding in &plan {
            listeners.push(Listener::bind(binding, &self.config.listener).await?);
        }

        let mut tasks = Vec::with_capacity(listeners.len());
        for listener in listeners {
            let acceptor = if listener.binding().is_https() {
                acceptor.clone()
            } else {
                None
            };
            tasks.push(tokio::spawn(accept_loop(
                listener,
                acceptor,
                Duration::from_secs(self.config.timeouts.tls_handshake_secs),
                self.router.clone(),
                self.tracker.clone(),
                shutdown.subscribe(),
            )));
        }

        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Listener task failed");
            }
        }

        if !self.tracker.drain(DRAIN_TIMEOUT).await {
            tracing::warn!(
                active = self.tracker.active_count(),
                "Connections still open after drain deadline"
            );
        }
        tracing::info!("Front end stopped");
        Ok(())
    }
}

async fn accept_loop(
    listener: Listener,
    acceptor: Option<TlsAcceptor>,
    handshake_timeout: Duration,
    router: Router,
    tracker: ConnectionTracker,
    mut shutdown: broadcast::Receiver<()>,
) {
    let local_addr = listener.local_addr().ok();
    tracing::info!(binding = %listener.binding(), address = ?local_addr, "Accepting connections");

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!(binding = %listener.binding(), "Listener stopping");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr, permit)) => {
                    let connection = Connection {
                        stream,
                        peer_addr,
                        binding: listener.binding().clone(),
                        guard: tracker.track(),
                        _permit: permit,
                    };
                    tokio::spawn(connection.serve(
                        acceptor.clone(),
                        handshake_timeout,
                        router.clone(),
                        shutdown.resubscribe(),
                    ));
                }
                Err(ListenerError::Closed) => break,
                Err(e) => {
                    tracing::warn!(error = %e, binding = %listener.binding(), "Accept failed");
                }
            }
        }
    }
}

/// One accepted TCP connection and the resources it holds.
struct Connection {
    stream: TcpStream,
    peer_addr: SocketAddr,
    binding: Binding,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
}

impl Connection {
    async fn serve(
        self,
        acceptor: Option<TlsAcceptor>,
        handshake_timeout: Duration,
        router: Router,
        shutdown: broadcast::Receiver<()>,
    ) {
        let id = self.guard.id();
        let Some(acceptor) = acceptor else {
            let info = ConnectionInfo::plain(id, self.peer_addr, self.binding);
            serve_io(self.stream, Arc::new(info), router, shutdown).await;
            return;
        };

        let tls = match tokio::time::timeout(handshake_timeout, acceptor.accept(self.stream)).await {
            Ok(Ok(tls)) => tls,
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %id, peer_addr = %self.peer_addr, error = %e, "TLS handshake failed");
                return;
            }
            Err(_) => {
                tracing::debug!(
                    connection_id = %id,
                    peer_addr = %self.peer_addr,
                    timeout = ?handshake_timeout,
                    "TLS handshake timed out"
                );
                return;
            }
        };

        let session = session_of(tls.get_ref().1);
        tracing::debug!(
            connection_id = %id,
            client_certificate = session.client_identity.is_some(),
            alpn = ?session.alpn_protocol.as_deref().map(String::from_utf8_lossy),
            "TLS handshake complete"
        );
        let info = ConnectionInfo::tls(id, self.peer_addr, self.binding, session);
        serve_io(tls, Arc::new(info), router, shutdown).await;
    }
}

/// Serve one connection until the peer leaves or shutdown fires. On
/// shutdown, in-flight requests finish and idle keep-alive connections
/// close right away.
async fn serve_io<I>(
    io: I,
    connection: Arc<ConnectionInfo>,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = connection.id();
    let service = service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(connection.clone());
        router.clone().oneshot(request.map(Body::new))
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), service);
    tokio::pin!(conn);

    let result = tokio::select! {
        result = conn.as_mut() => result,
        _ = shutdown.recv() => {
            tracing::debug!(connection_id = %id, "Closing connection for shutdown");
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    };
    if let Err(e) = result {
        tracing::debug!(connection_id = %id, error = %e, "Connection ended with error");
    }
}

/// Hand one request to the hosting strategy.
async fn bridge_handler(State(state): State<BridgeState>, mut request: Request) -> Response {
    let topology = state.model.topology();

    let Some(connection) = request.extensions().get::<Arc<ConnectionInfo>>().cloned() else {
        tracing::error!("Request arrived without connection info");
        return (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response();
    };

    let Some(uri) = strip_application_path(request.uri(), &state.application_path) else {
        tracing::debug!(path = %request.uri().path(), "Outside application path");
        metrics::record_request(topology, StatusCode::NOT_FOUND.as_u16());
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    };
    *request.uri_mut() = uri;

    let response = hosting::dispatch(state.model.as_ref(), request, &connection).await;
    metrics::record_request(topology, response.status().as_u16());
    response
}
