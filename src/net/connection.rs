//! Per-connection metadata and lifecycle tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Classify each accepted connection (listener, TLS, client identity, ALPN)
//! - Track live connections so shutdown can drain them

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::binding::Binding;
use crate::hosting::ClientIdentity;

/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Classification of one accepted connection.
///
/// Attached to every request on the connection as `Arc<ConnectionInfo>`.
/// Nothing in it outlives the connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    id: ConnectionId,
    peer_addr: SocketAddr,
    binding: Binding,
    tls: Option<TlsSession>,
}

/// What the TLS handshake established.
#[derive(Debug, Clone, Default)]
pub struct TlsSession {
    pub client_identity: Option<ClientIdentity>,
    pub alpn_protocol: Option<Vec<u8>>,
}

impl ConnectionInfo {
    /// A connection accepted on a plain listener.
    pub fn plain(id: ConnectionId, peer_addr: SocketAddr, binding: Binding) -> Self {
        Self {
            id,
            peer_addr,
            binding,
            tls: None,
        }
    }

    /// A connection that completed a TLS handshake.
    pub fn tls(id: ConnectionId, peer_addr: SocketAddr, binding: Binding, session: TlsSession) -> Self {
        Self {
            id,
            peer_addr,
            binding,
            tls: Some(session),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The binding whose listener accepted this connection.
    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Certificate offered on this exact connection, if any.
    pub fn client_identity(&self) -> Option<&ClientIdentity> {
        self.tls.as_ref().and_then(|s| s.client_identity.as_ref())
    }

    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        self.tls.as_ref().and_then(|s| s.alpn_protocol.as_deref())
    }

    pub fn scheme(&self) -> &'static str {
        if self.is_tls() {
            "https"
        } else {
            "http"
        }
    }
}

/// Tracks active connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active_count: Arc<AtomicU64>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new active connection. Returns a guard that decrements on drop.
    pub fn track(&self) -> ConnectionGuard {
        self.active_count.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active_count: Arc::clone(&self.active_count),
            id: ConnectionId::new(),
        }
    }

    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::SeqCst)
    }

    /// Wait until all connections are closed or the deadline passes.
    ///
    /// Returns false when connections were still open at the deadline.
    pub async fn drain(&self, deadline: Duration) -> bool {
        let wait = async {
            while self.active_count() > 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        };
        tokio::time::timeout(deadline, wait).await.is_ok()
    }
}

/// Guard that tracks a connection's lifetime.
#[derive(Debug)]
pub struct ConnectionGuard {
    active_count: Arc<AtomicU64>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active_count.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
