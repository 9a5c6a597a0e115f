//! Generation-specific behavior that deployments rely on.
//!
//! Each quirk is decided once at startup and installed as a layer in
//! front of the hosting strategy, so request handling never branches on
//! generation.

pub mod redirect;

pub use redirect::{redirect_middleware, RedirectPolicy};
