//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load config → Validate → Resolve https port → Project environment
//!     → Launch backend (Proxied) → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Every startup-time fact is computed once and frozen in `BridgeSettings`
//! - Listeners start last (traffic only when the backend is ready)
//! - Shutdown has a drain deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use signals::shutdown_signal;
pub use startup::{launch_backend, BackendProcess, BridgeSettings, StartupError};
