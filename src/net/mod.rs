//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (handshake on https bindings, capture client cert + ALPN)
//!     → connection.rs (ConnectionInfo, lifecycle tracking)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - Classification happens once per connection, at accept time
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::{ConnectionGuard, ConnectionId, ConnectionInfo, ConnectionTracker, TlsSession};
pub use listener::{Listener, ListenerError};
