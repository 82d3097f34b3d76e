//! Process handle capability.
//!
//! The registry never talks to the OS directly. It asks a [`Spawner`] for a
//! [`ProcessHandle`] and drives the lifecycle through it, which lets tests
//! substitute in-memory fakes for real child processes.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Spawn and signal failures surface as `ProcessError`

mod capture;
mod os;

pub use capture::{CaptureBuffer, MAX_CAPTURE_BYTES};
pub use os::{OsProcess, OsSpawner};

use std::path::Path;

use chrono::Duration;
use thiserror::Error;

/// A live (or exited) OS process owned by a registry entry.
pub trait ProcessHandle: Send {
    /// OS process id.
    fn pid(&self) -> u32;

    /// Returns true while the process is running.
    fn is_active(&mut self) -> bool;

    /// Terminates the process (and its process group).
    fn kill(&mut self) -> Result<(), ProcessError>;

    /// Time since the process was spawned.
    fn uptime(&self) -> Duration;

    /// Latest CPU usage sample, in percent of one core.
    fn cpu_percent(&mut self) -> f64;

    /// Latest resident memory sample, in bytes.
    fn memory_bytes(&mut self) -> f64;

    /// Takes stdout bytes produced since the previous drain.
    fn drain_stdout(&mut self) -> Vec<u8>;

    /// Takes stderr bytes produced since the previous drain.
    fn drain_stderr(&mut self) -> Vec<u8>;
}

/// Launches processes.
pub trait Spawner: Send + Sync {
    /// Runs `command` through the shell in `workdir`.
    fn spawn(&self, command: &str, workdir: &Path) -> Result<Box<dyn ProcessHandle>, ProcessError>;
}

/// Errors from spawning or signalling a process.
#[derive(Debug, Clone, Error)]
pub enum ProcessError {
    #[error("failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    #[error("failed to kill pid {pid}: {error}")]
    Kill { pid: u32, error: String },
}
