//! Registry actor commands, errors, and reply types.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - Reply payloads (`BulkOutcome`, `ProcessView`, `MetricValue`, `ProcessSample`)
//!
//! All types are designed for async message passing and follow the panic-free policy.

use chrono::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

use pm_core::{ProcessName, ProcessSpec};
use pm_protocol::{Metric, Stream};

use crate::process::ProcessError;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command uses a oneshot channel for the response, enabling
/// request-response patterns in async code without blocking.
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a stopped process.
    ///
    /// # Errors
    /// - `RegistryError::AlreadyExists` if the name is taken
    Add {
        spec: Box<ProcessSpec>,
        log_cpu: bool,
        log_memory: bool,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Start one stopped process.
    ///
    /// # Errors
    /// - `RegistryError::NotFound`, `RegistryError::AlreadyActive`,
    ///   `RegistryError::Process`
    Start {
        name: String,
        respond_to: oneshot::Sender<Result<u32, RegistryError>>,
    },

    /// Start every stopped process.
    StartAll {
        respond_to: oneshot::Sender<BulkOutcome>,
    },

    /// Kill-if-active then start one process.
    ///
    /// # Errors
    /// - `RegistryError::NotFound`, `RegistryError::Process`
    Restart {
        name: String,
        respond_to: oneshot::Sender<Result<u32, RegistryError>>,
    },

    /// Restart every process.
    RestartAll {
        respond_to: oneshot::Sender<BulkOutcome>,
    },

    /// Kill one running process. It stays registered.
    ///
    /// # Errors
    /// - `RegistryError::NotFound`, `RegistryError::NotActive`,
    ///   `RegistryError::Process`
    Kill {
        name: String,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Kill (if active) and unregister one process.
    ///
    /// # Errors
    /// - `RegistryError::NotFound`, `RegistryError::Process`
    Remove {
        name: String,
        respond_to: oneshot::Sender<Result<(), RegistryError>>,
    },

    /// Snapshot of every process in insertion order.
    List {
        respond_to: oneshot::Sender<Vec<ProcessView>>,
    },

    /// Read one metric for one process, or for all when `name` is `None`.
    ///
    /// # Errors
    /// - `RegistryError::NotFound` if `name` is given and unknown
    Metrics {
        name: Option<String>,
        metric: Metric,
        respond_to: oneshot::Sender<Result<Vec<(ProcessName, MetricValue)>, RegistryError>>,
    },

    /// Read the captured output of one process.
    ///
    /// # Errors
    /// - `RegistryError::NotFound`
    Output {
        name: String,
        stream: Stream,
        respond_to: oneshot::Sender<Result<Vec<u8>, RegistryError>>,
    },

    /// One monitor cycle: drain pipes and sample enrolled metrics.
    Sample {
        respond_to: oneshot::Sender<Vec<ProcessSample>>,
    },

    /// Whether any process is running.
    HasActive {
        respond_to: oneshot::Sender<bool>,
    },

    /// Kill every running process. Returns how many were killed.
    Shutdown {
        respond_to: oneshot::Sender<usize>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
///
/// Uses `thiserror` for ergonomic error handling and Display implementations.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// The requested process was not found.
    #[error("process not found: {0}")]
    NotFound(String),

    /// A process with this name already exists.
    #[error("process already exists: {0}")]
    AlreadyExists(ProcessName),

    /// The process is already running.
    #[error("process already active: {0}")]
    AlreadyActive(String),

    /// The process is not running.
    #[error("process not active: {0}")]
    NotActive(String),

    /// The OS refused a spawn or signal.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The response channel was closed before receiving a response.
    ///
    /// This typically indicates the actor was shut down.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Reply Types
// ============================================================================

/// Result of a bulk start/restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Processes successfully (re)started
    pub succeeded: usize,
    /// Registry size when the command ran
    pub total: usize,
}

/// Read-only snapshot of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessView {
    pub name: ProcessName,
    pub command: String,
    pub pid: Option<u32>,
}

/// One metric reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Memory(f64),
    Cpu(f64),
    /// `None` while stopped
    Pid(Option<u32>),
    Uptime(Duration),
}

/// What one monitor cycle observed for one process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub name: ProcessName,
    /// Present when enrolled for CPU logging
    pub cpu: Option<f64>,
    /// Present when enrolled for memory logging
    pub memory: Option<f64>,
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
}
