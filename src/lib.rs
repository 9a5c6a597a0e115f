//! Hosting bridge between a TLS-terminating front end and an application.
//!
//! The front end forwards what only it can observe (https port, protocol
//! version, client certificate, close intent) to an application hosted
//! either in-process (co-resident) or behind a loopback hop (proxied).

pub mod app;
pub mod backend;
pub mod binding;
pub mod config;
pub mod hosting;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod quirks;

pub use config::BridgeConfig;
pub use http::FrontEnd;
pub use lifecycle::{BridgeSettings, Shutdown};
