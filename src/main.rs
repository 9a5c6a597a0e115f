//! Hosting bridge front end.
//!
//! ```text
//!     Client ──TLS──▶ net (listener, tls) ──▶ http (layers, redirect quirk)
//!                                               │
//!                                 ┌─────────────┴─────────────┐
//!                                 ▼                           ▼
//!                        CoResident (Router)        Proxied (loopback HTTP/1.1)
//!                                                             │
//!                                                             ▼
//!                                                     backend process
//! ```

use std::path::PathBuf;

use clap::Parser;

use hosting_bridge::app::diagnostics_router;
use hosting_bridge::config::{load_config, TopologyMode};
use hosting_bridge::lifecycle::{launch_backend, shutdown_signal, BridgeSettings, Shutdown};
use hosting_bridge::observability::{logging, metrics};
use hosting_bridge::FrontEnd;

#[derive(Parser, Debug)]
#[command(name = "hosting-bridge", version, about = "TLS front end hosting an application")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "bridge.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    logging::init(&config.observability.log_level);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %args.config.display(),
        "hosting-bridge starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let settings = BridgeSettings::prepare(&config)?;

    let backend = match settings.topology {
        TopologyMode::Proxied => launch_backend(&config.backend, &settings).await?,
        TopologyMode::CoResident => None,
    };
    let app = match settings.topology {
        TopologyMode::CoResident => Some(diagnostics_router()),
        TopologyMode::Proxied => None,
    };

    let front_end = FrontEnd::new(config, &settings, app)?;

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        trigger.trigger();
    });

    front_end.run(shutdown).await?;

    if let Some(backend) = backend {
        backend.stop().await;
    }
    tracing::info!("Shutdown complete");
    Ok(())
}
