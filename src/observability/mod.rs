//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters, exported for Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through the tower-http trace spans
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
