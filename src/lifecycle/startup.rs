//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate configuration and resolve the https port once
//! - Freeze every startup-time fact into `BridgeSettings`
//! - Launch the backend process (Proxied) and wait until it accepts
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Nothing in `BridgeSettings` changes after `prepare` returns

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use uuid::Uuid;

use crate::binding::projector::{self, operator_override, InvalidOverride};
use crate::binding::{resolve_with_override, BackendEnvironment, ResolvedHttpsPort};
use crate::config::{validate_config, BackendConfig, BridgeConfig, BridgeGeneration, TopologyMode, ValidationError};
use crate::hosting::ConnectionHeaderPolicy;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("invalid configuration: {}", join(.0))]
    Invalid(Vec<ValidationError>),
    #[error(transparent)]
    Override(#[from] InvalidOverride),
    #[error("backend.address {0:?} is not a socket address")]
    BackendAddress(String),
    #[error("failed to launch backend {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("backend exited during startup ({0})")]
    BackendExited(std::process::ExitStatus),
    #[error("backend did not accept connections on {addr} within {timeout:?}")]
    BackendNotReady { addr: SocketAddr, timeout: Duration },
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Immutable bridge facts computed at startup.
#[derive(Debug, Clone)]
pub struct BridgeSettings {
    pub topology: TopologyMode,
    pub generation: BridgeGeneration,
    pub https_port: ResolvedHttpsPort,
    pub header_policy: ConnectionHeaderPolicy,
    pub environment: Arc<BackendEnvironment>,
    pub application_path: String,
    pub pairing_token: String,
    pub backend_address: Option<SocketAddr>,
}

impl BridgeSettings {
    /// Validate `config` and compute everything the front end and the
    /// backend need to agree on.
    pub fn prepare(config: &BridgeConfig) -> Result<Self, StartupError> {
        validate_config(config).map_err(StartupError::Invalid)?;

        let operator = operator_override(&config.backend.environment)?;
        let https_port = resolve_with_override(&config.bindings, operator);
        match https_port {
            ResolvedHttpsPort::Ambiguous => tracing::warn!(
                bindings = config.bindings.len(),
                "https port is ambiguous; backend will not see BRIDGE_HTTPS_PORT"
            ),
            resolved => tracing::info!(https_port = %resolved, "Resolved https port"),
        }

        let backend_address = match config.backend.address.as_deref() {
            Some(addr) => Some(
                addr.parse::<SocketAddr>()
                    .map_err(|_| StartupError::BackendAddress(addr.to_string()))?,
            ),
            None => None,
        };

        let pairing_token = Uuid::new_v4().simple().to_string();

        let mut environment =
            BackendEnvironment::project(https_port, &config.backend.environment)
                .with_server_addresses(&config.bindings, &config.application.path);
        if config.topology == TopologyMode::Proxied {
            if let Some(addr) = backend_address {
                environment = environment.with(projector::PORT, addr.port().to_string());
            }
            environment = environment.with(projector::PAIRING_TOKEN, pairing_token.clone());
        }

        let header_policy = ConnectionHeaderPolicy::from_config(
            config.topology,
            config.handler.forward_response_connection_header,
        );
        if config.handler.forward_response_connection_header
            && config.topology == TopologyMode::CoResident
        {
            tracing::warn!(
                "handler.forward_response_connection_header has no effect in co-resident topology"
            );
        }

        Ok(Self {
            topology: config.topology,
            generation: config.generation,
            https_port,
            header_policy,
            environment: Arc::new(environment),
            application_path: config.application.path.clone(),
            pairing_token,
            backend_address,
        })
    }
}

/// A backend launched by the bridge. Killed when dropped.
#[derive(Debug)]
pub struct BackendProcess {
    child: Child,
    addr: SocketAddr,
}

impl BackendProcess {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Stop the backend and wait for it to exit.
    pub async fn stop(mut self) {
        if let Err(e) = self.child.kill().await {
            tracing::warn!(error = %e, "Failed to stop backend");
        }
    }
}

/// Launch the configured backend with the projected environment.
///
/// Returns `None` when no command is configured (externally managed backend).
pub async fn launch_backend(
    config: &BackendConfig,
    settings: &BridgeSettings,
) -> Result<Option<BackendProcess>, StartupError> {
    let (Some(command), Some(addr)) = (config.command.as_deref(), settings.backend_address) else {
        return Ok(None);
    };

    let mut child = backend_command(command, config, settings)
        .spawn()
        .map_err(|source| StartupError::Spawn {
            command: command.to_string(),
            source,
        })?;

    tracing::info!(command = %command, pid = ?child.id(), address = %addr, "Backend launched");

    let timeout = Duration::from_secs(config.startup_timeout_secs);
    wait_until_ready(&mut child, addr, timeout).await?;

    tracing::info!(address = %addr, "Backend ready");
    Ok(Some(BackendProcess { child, addr }))
}

/// The backend inherits the front end's environment except for the
/// reserved bridge keys, which come from the projection alone. An
/// `Ambiguous` port therefore reaches the backend as an absent key.
fn backend_command(command: &str, config: &BackendConfig, settings: &BridgeSettings) -> Command {
    let mut cmd = Command::new(command);
    cmd.args(&config.args);
    for key in projector::RESERVED {
        cmd.env_remove(key);
    }
    cmd.envs(settings.environment.iter()).kill_on_drop(true);
    cmd
}

async fn wait_until_ready(child: &mut Child, addr: SocketAddr, timeout: Duration) -> Result<(), StartupError> {
    let started = Instant::now();
    let mut attempt = 0;
    loop {
        if TcpStream::connect(addr).await.is_ok() {
            return Ok(());
        }
        if let Ok(Some(status)) = child.try_wait() {
            return Err(StartupError::BackendExited(status));
        }
        if started.elapsed() >= timeout {
            return Err(StartupError::BackendNotReady { addr, timeout });
        }
        attempt += 1;
        let delay = readiness_backoff(attempt, 50, 1000);
        tracing::debug!(attempt, delay = ?delay, address = %addr, "Backend not ready yet");
        tokio::time::sleep(delay).await;
    }
}

/// Exponential backoff with up to 10% jitter.
fn readiness_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::from_millis(0);
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use crate::config::TlsConfig;

    fn proxied_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.bindings = vec![Binding::http(5000), Binding::https(5001)];
        config.backend.address = Some("127.0.0.1:5100".to_string());
        config.tls = Some(TlsConfig {
            cert_path: "cert.pem".to_string(),
            key_path: "key.pem".to_string(),
            client_ca_path: None,
        });
        config
    }

    #[test]
    fn proxied_environment_carries_port_and_token() {
        let settings = BridgeSettings::prepare(&proxied_config()).unwrap();

        assert_eq!(settings.https_port, ResolvedHttpsPort::Unambiguous(5001));
        assert_eq!(settings.environment.https_port(), Some(5001));
        assert_eq!(settings.environment.get(projector::PORT), Some("5100"));
        assert_eq!(
            settings.environment.pairing_token(),
            Some(settings.pairing_token.as_str())
        );
        assert_eq!(settings.pairing_token.len(), 32);
        assert_eq!(
            settings.environment.server_addresses(),
            vec!["http://localhost:5000", "https://localhost:5001"]
        );
    }

    #[test]
    fn co_resident_environment_has_no_token() {
        let mut config = proxied_config();
        config.topology = TopologyMode::CoResident;
        config.backend.address = None;
        let settings = BridgeSettings::prepare(&config).unwrap();

        assert!(settings.environment.pairing_token().is_none());
        assert!(settings.environment.get(projector::PORT).is_none());
        assert_eq!(settings.header_policy, ConnectionHeaderPolicy::Default);
    }

    #[test]
    fn operator_override_wins() {
        let mut config = proxied_config();
        config
            .backend
            .environment
            .insert(projector::HTTPS_PORT.to_string(), "123".to_string());
        let settings = BridgeSettings::prepare(&config).unwrap();

        assert_eq!(settings.https_port, ResolvedHttpsPort::Overridden(123));
        assert_eq!(settings.environment.https_port(), Some(123));
    }

    #[test]
    fn ambiguous_bindings_leave_signal_absent() {
        let mut config = proxied_config();
        config.bindings.push(Binding::https(5002));
        let settings = BridgeSettings::prepare(&config).unwrap();

        assert_eq!(settings.https_port, ResolvedHttpsPort::Ambiguous);
        assert!(settings.environment.get(projector::HTTPS_PORT).is_none());
    }

    #[test]
    fn invalid_config_lists_every_error() {
        let mut config = BridgeConfig::default();
        config.listener.bind_ip = "nope".to_string();
        let err = BridgeSettings::prepare(&config).unwrap_err();
        match err {
            StartupError::Invalid(errors) => assert!(errors.len() >= 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn force_forward_only_for_proxied() {
        let mut config = proxied_config();
        config.handler.forward_response_connection_header = true;
        let settings = BridgeSettings::prepare(&config).unwrap();
        assert_eq!(settings.header_policy, ConnectionHeaderPolicy::ForceForward);
    }

    #[test]
    fn tokens_differ_between_runs() {
        let a = BridgeSettings::prepare(&proxied_config()).unwrap();
        let b = BridgeSettings::prepare(&proxied_config()).unwrap();
        assert_ne!(a.pairing_token, b.pairing_token);
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(readiness_backoff(0, 50, 1000), Duration::ZERO);
        assert!(readiness_backoff(1, 50, 1000).as_millis() >= 50);
        assert!(readiness_backoff(3, 50, 1000).as_millis() >= 200);
        let capped = readiness_backoff(20, 50, 1000).as_millis();
        assert!((1000..1100).contains(&capped));
    }

    #[tokio::test]
    async fn no_command_means_external_backend() {
        let settings = BridgeSettings::prepare(&proxied_config()).unwrap();
        let launched = launch_backend(&BackendConfig::default(), &settings).await.unwrap();
        assert!(launched.is_none());
    }

    fn command_env(cmd: &Command, key: &str) -> Option<Option<String>> {
        cmd.as_std()
            .get_envs()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.map(|v| v.to_string_lossy().into_owned()))
    }

    #[test]
    fn ambiguous_port_is_removed_from_backend_command() {
        let mut config = proxied_config();
        config.bindings.push(Binding::https(5002));
        let settings = BridgeSettings::prepare(&config).unwrap();
        let cmd = backend_command("backend", &config.backend, &settings);

        assert_eq!(command_env(&cmd, projector::HTTPS_PORT), Some(None));
        assert_eq!(command_env(&cmd, projector::PORT), Some(Some("5100".to_string())));
        assert_eq!(
            command_env(&cmd, projector::PAIRING_TOKEN),
            Some(Some(settings.pairing_token.clone()))
        );
    }

    #[test]
    fn resolved_port_is_set_on_backend_command() {
        let config = proxied_config();
        let settings = BridgeSettings::prepare(&config).unwrap();
        let cmd = backend_command("backend", &config.backend, &settings);

        assert_eq!(command_env(&cmd, projector::HTTPS_PORT), Some(Some("5001".to_string())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn launched_backend_does_not_inherit_https_port() {
        std::env::set_var(projector::HTTPS_PORT, "9999");
        let dump = std::env::temp_dir().join(format!("hosting-bridge-env-{}", std::process::id()));

        let mut config = proxied_config();
        config.bindings.push(Binding::https(5002));
        config.backend.address = Some("127.0.0.1:28998".to_string());
        config.backend.command = Some("sh".to_string());
        config.backend.args = vec!["-c".to_string(), format!("env > '{}'", dump.display())];
        let settings = BridgeSettings::prepare(&config).unwrap();
        assert_eq!(settings.https_port, ResolvedHttpsPort::Ambiguous);

        let err = launch_backend(&config.backend, &settings).await.unwrap_err();
        std::env::remove_var(projector::HTTPS_PORT);
        assert!(matches!(err, StartupError::BackendExited(_)));

        let seen = std::fs::read_to_string(&dump).unwrap();
        let _ = std::fs::remove_file(&dump);
        assert!(!seen.lines().any(|l| l.starts_with("BRIDGE_HTTPS_PORT=")), "{seen}");
        assert!(seen.lines().any(|l| l == "BRIDGE_PORT=28998"), "{seen}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn backend_exiting_early_is_reported() {
        let mut config = proxied_config();
        config.backend.address = Some("127.0.0.1:28999".to_string());
        config.backend.command = Some("false".to_string());
        let settings = BridgeSettings::prepare(&config).unwrap();

        let err = launch_backend(&config.backend, &settings).await.unwrap_err();
        assert!(matches!(err, StartupError::BackendExited(_)));
    }
}
