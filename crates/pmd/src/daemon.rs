//! Daemon orchestration: boot, serve, monitor, shut down.
//!
//! # Lifecycle
//!
//! 1. [`Daemon::bind`] validates the config, registers `[[process]]`
//!    entries and binds the listener. A bind failure is fatal.
//! 2. [`Daemon::run`] starts every registered process, runs the accept loop
//!    on its own task and the monitor loop on the caller's task.
//! 3. When the token is cancelled (signal or `stop` request) both loops
//!    exit, the listener closes and every running process is killed.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Startup errors return `DaemonError`; runtime errors are logged

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{ConfigError, DaemonConfig};
use crate::dispatch::Dispatcher;
use crate::monitor::MonitorLoop;
use crate::process::Spawner;
use crate::registry::{spawn_registry, RegistryError, RegistryHandle};
use crate::server::{DaemonServer, ServerError};

/// A bound, not yet running daemon.
pub struct Daemon {
    config: DaemonConfig,
    registry: RegistryHandle,
    server: DaemonServer,
    cancel_token: CancellationToken,
}

impl Daemon {
    /// Validates `config`, registers its processes and binds the listener.
    ///
    /// Must be called inside a tokio runtime.
    pub async fn bind(
        config: DaemonConfig,
        spawner: Arc<dyn Spawner>,
        cancel_token: CancellationToken,
    ) -> Result<Self, DaemonError> {
        let boot = config.validate()?;
        let registry = spawn_registry(spawner);

        for entry in boot {
            registry
                .add(entry.spec, entry.log_cpu, entry.log_memory)
                .await?;
        }

        let dispatcher = Dispatcher::new(registry.clone(), config.workdir.clone(), config.address());
        let server =
            DaemonServer::bind(&config.host, config.port, dispatcher, cancel_token.clone()).await?;

        Ok(Self {
            config,
            registry,
            server,
            cancel_token,
        })
    }

    /// Address the control server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Handle to the registry, for embedding and tests.
    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    /// Runs until the cancellation token fires, then shuts down.
    pub async fn run(self) -> Result<(), DaemonError> {
        let Self {
            config,
            registry,
            server,
            cancel_token,
        } = self;

        match registry.start_all().await {
            Ok(outcome) if outcome.total > 0 => info!(
                started = outcome.succeeded,
                total = outcome.total,
                "Started configured processes"
            ),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to start configured processes"),
        }

        let server_task = tokio::spawn(server.run());

        let monitor = MonitorLoop::new(registry.clone(), &config.log_dir, config.log_frequency);
        let cycles = monitor.run(cancel_token.clone()).await;

        // The monitor only returns on its own if the registry died; make
        // sure the server follows.
        cancel_token.cancel();

        let server_result = match server_task.await {
            Ok(result) => result.map_err(DaemonError::from),
            Err(e) => {
                error!(error = %e, "Server task failed");
                Err(DaemonError::ServerTask(e.to_string()))
            }
        };

        let had_active = registry.has_active().await.unwrap_or(false);
        let killed = registry.shutdown().await.unwrap_or(0);
        info!(
            monitor_cycles = cycles,
            had_active = had_active,
            killed = killed,
            "Daemon shut down"
        );

        server_result
    }
}

/// Errors that stop the daemon from starting or running.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Failed to register configured process: {0}")]
    Registry(#[from] RegistryError),

    #[error("Server task failed: {0}")]
    ServerTask(String),
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ProcessConfig;
    use crate::testing::FakeSpawner;

    fn config(processes: Vec<ProcessConfig>) -> DaemonConfig {
        DaemonConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_dir: std::env::temp_dir().join("pmd-daemon-unit-logs"),
            processes,
            ..DaemonConfig::default()
        }
    }

    fn entry(name: &str) -> ProcessConfig {
        ProcessConfig {
            name: name.to_string(),
            command: "sleep 100".to_string(),
            workdir: None,
            log_cpu: false,
            log_memory: false,
        }
    }

    #[tokio::test]
    async fn test_boot_processes_start_and_die_with_daemon() {
        let spawner = FakeSpawner::new();
        let cancel = CancellationToken::new();
        let daemon = Daemon::bind(
            config(vec![entry("a"), entry("b")]),
            Arc::new(spawner.clone()),
            cancel.clone(),
        )
        .await
        .unwrap();
        assert_ne!(daemon.local_addr().port(), 0);

        let registry = daemon.registry().clone();
        let task = tokio::spawn(daemon.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(spawner.spawn_count(), 2);
        assert!(registry.has_active().await.unwrap());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(spawner.killed_pids().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected_before_binding() {
        let result = Daemon::bind(
            config(vec![entry("dup"), entry("dup")]),
            Arc::new(FakeSpawner::new()),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(DaemonError::Config(ConfigError::DuplicateName(_)))));
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let result = Daemon::bind(
            DaemonConfig {
                port,
                ..config(Vec::new())
            },
            Arc::new(FakeSpawner::new()),
            CancellationToken::new(),
        )
        .await;
        assert!(matches!(result, Err(DaemonError::Server(ServerError::Bind { .. }))));
    }
}
