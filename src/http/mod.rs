//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (net)
//!     → server.rs (hyper auto builder, HTTP/1.1 or HTTP/2)
//!     → request id, trace, timeout, redirect quirk (tower layers)
//!     → request.rs (application mount point)
//!     → hosting strategy (CoResident | Proxied)
//!     → client
//! ```

pub mod request;
pub mod server;

pub use request::strip_application_path;
pub use server::{FrontEnd, FrontEndError};
