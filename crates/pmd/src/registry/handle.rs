//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor from the acceptor and the monitor loop.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed`

use tokio::sync::{mpsc, oneshot};

use pm_core::{ProcessName, ProcessSpec};
use pm_protocol::{Metric, Stream};

use super::commands::{
    BulkOutcome, MetricValue, ProcessSample, ProcessView, RegistryCommand, RegistryError,
};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// let handle = spawn_registry(Arc::new(OsSpawner));
/// handle.add(spec, false, true).await?;
/// let pid = handle.start("web").await?;
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    pub fn new(sender: mpsc::Sender<RegistryCommand>) -> Self {
        Self { sender }
    }

    /// Sends one command and waits for its reply.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> RegistryCommand,
    ) -> Result<T, RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(build(tx))
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Register a stopped process.
    ///
    /// # Errors
    ///
    /// - `RegistryError::AlreadyExists` if the name is taken
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn add(
        &self,
        spec: ProcessSpec,
        log_cpu: bool,
        log_memory: bool,
    ) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::Add {
            spec: Box::new(spec),
            log_cpu,
            log_memory,
            respond_to,
        })
        .await?
    }

    /// Start one stopped process, returning its pid.
    pub async fn start(&self, name: &str) -> Result<u32, RegistryError> {
        self.request(|respond_to| RegistryCommand::Start {
            name: name.to_string(),
            respond_to,
        })
        .await?
    }

    /// Start every stopped process.
    pub async fn start_all(&self) -> Result<BulkOutcome, RegistryError> {
        self.request(|respond_to| RegistryCommand::StartAll { respond_to })
            .await
    }

    /// Kill-if-active then start one process, returning the new pid.
    pub async fn restart(&self, name: &str) -> Result<u32, RegistryError> {
        self.request(|respond_to| RegistryCommand::Restart {
            name: name.to_string(),
            respond_to,
        })
        .await?
    }

    /// Restart every process.
    pub async fn restart_all(&self) -> Result<BulkOutcome, RegistryError> {
        self.request(|respond_to| RegistryCommand::RestartAll { respond_to })
            .await
    }

    /// Kill one running process.
    ///
    /// # Errors
    ///
    /// - `RegistryError::NotActive` if it is not running
    pub async fn kill(&self, name: &str) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::Kill {
            name: name.to_string(),
            respond_to,
        })
        .await?
    }

    /// Kill (if running) and unregister one process.
    pub async fn remove(&self, name: &str) -> Result<(), RegistryError> {
        self.request(|respond_to| RegistryCommand::Remove {
            name: name.to_string(),
            respond_to,
        })
        .await?
    }

    /// Snapshot of every process in insertion order.
    pub async fn list(&self) -> Result<Vec<ProcessView>, RegistryError> {
        self.request(|respond_to| RegistryCommand::List { respond_to })
            .await
    }

    /// Read one metric for `name`, or for every process when `None`.
    pub async fn metrics(
        &self,
        name: Option<&str>,
        metric: Metric,
    ) -> Result<Vec<(ProcessName, MetricValue)>, RegistryError> {
        self.request(|respond_to| RegistryCommand::Metrics {
            name: name.map(str::to_string),
            metric,
            respond_to,
        })
        .await?
    }

    /// Captured output of one process.
    pub async fn output(&self, name: &str, stream: Stream) -> Result<Vec<u8>, RegistryError> {
        self.request(|respond_to| RegistryCommand::Output {
            name: name.to_string(),
            stream,
            respond_to,
        })
        .await?
    }

    /// Run one monitor cycle.
    pub async fn sample(&self) -> Result<Vec<ProcessSample>, RegistryError> {
        self.request(|respond_to| RegistryCommand::Sample { respond_to })
            .await
    }

    /// Whether any process is running.
    pub async fn has_active(&self) -> Result<bool, RegistryError> {
        self.request(|respond_to| RegistryCommand::HasActive { respond_to })
            .await
    }

    /// Kill every running process, returning how many were killed.
    pub async fn shutdown(&self) -> Result<usize, RegistryError> {
        self.request(|respond_to| RegistryCommand::Shutdown { respond_to })
            .await
    }
}
