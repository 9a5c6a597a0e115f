//! TCP listener implementation with backpressure.
//!
//! # Responsibilities
//! - Bind one socket per distinct binding port
//! - Accept incoming TCP connections
//! - Enforce max_connections limit via semaphore

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::binding::Binding;
use crate::config::ListenerConfig;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("invalid bind address {0:?}")]
    Address(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to accept: {0}")]
    Accept(#[source] std::io::Error),
    #[error("connection limit closed")]
    Closed,
}

/// A bounded TCP listener serving one binding.
///
/// When `max_connections` is reached, new connections wait until a slot
/// becomes available.
pub struct Listener {
    inner: TcpListener,
    binding: Binding,
    connection_limit: Arc<Semaphore>,
}

impl Listener {
    /// Bind the binding's port on the configured address.
    pub async fn bind(binding: &Binding, config: &ListenerConfig) -> Result<Self, ListenerError> {
        let ip: IpAddr = config
            .bind_ip
            .parse()
            .map_err(|_| ListenerError::Address(config.bind_ip.clone()))?;
        let addr = SocketAddr::new(ip, binding.port);

        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;

        tracing::info!(
            binding = %binding,
            address = %addr,
            max_connections = config.max_connections,
            "Listener bound"
        );

        Ok(Self {
            inner,
            binding: binding.clone(),
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Accept a new connection, respecting the connection limit.
    ///
    /// The returned permit must be held for the connection's lifetime.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit), ListenerError> {
        let permit = self
            .connection_limit
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ListenerError::Closed)?;

        let (stream, addr) = self.inner.accept().await.map_err(ListenerError::Accept)?;

        tracing::debug!(
            peer_addr = %addr,
            binding = %self.binding,
            available_permits = self.connection_limit.available_permits(),
            "Connection accepted"
        );

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }
}

/// A permit representing a connection slot, released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _permit: OwnedSemaphorePermit,
}

/// One listener per port: bindings that only differ by host share a socket.
pub fn listener_plan(bindings: &[Binding]) -> Vec<Binding> {
    let mut plan: Vec<Binding> = Vec::new();
    for binding in bindings {
        if !plan.iter().any(|b| b.port == binding.port) {
            plan.push(binding.clone());
        }
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Protocol;

    #[test]
    fn plan_dedupes_ports() {
        let bindings = vec![
            Binding::https(44301),
            Binding::new(Protocol::Https, 44301, "example.com"),
            Binding::http(8080),
        ];
        let plan = listener_plan(&bindings);
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].host, "localhost");
        assert_eq!(plan[1].port, 8080);
    }

    #[tokio::test]
    async fn binds_and_reports_binding() {
        let config = ListenerConfig {
            bind_ip: "127.0.0.1".to_string(),
            max_connections: 4,
        };
        let listener = Listener::bind(&Binding::http(0), &config).await.unwrap();
        assert_eq!(listener.binding().port, 0);
        assert!(listener.local_addr().unwrap().port() > 0);
    }

    #[tokio::test]
    async fn rejects_bad_bind_ip() {
        let config = ListenerConfig {
            bind_ip: "not-an-ip".to_string(),
            max_connections: 4,
        };
        let err = Listener::bind(&Binding::http(0), &config).await.err().unwrap();
        assert!(matches!(err, ListenerError::Address(_)));
    }
}
