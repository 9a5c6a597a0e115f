//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → lifecycle::startup turns it into BridgeSettings
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload path
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::{
    ApplicationConfig, BackendConfig, BridgeConfig, BridgeGeneration, HandlerConfig,
    ListenerConfig, ObservabilityConfig, TimeoutConfig, TlsConfig, TopologyMode,
};
pub use loader::{load_config, parse_config, ConfigError};
pub use validation::{validate_config, ValidationError};
