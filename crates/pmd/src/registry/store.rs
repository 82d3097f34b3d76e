//! Registry storage: managed processes and their logging enrollment.
//!
//! `Registry` is plain data with no locking of its own. It is owned by the
//! `RegistryActor`, which serializes every access from the acceptor and the
//! monitor loop.

use std::collections::HashSet;

use chrono::Duration;
use tracing::{debug, info};

use pm_core::{ProcessName, ProcessSpec};
use pm_protocol::Stream;

use crate::process::{CaptureBuffer, ProcessError, ProcessHandle, Spawner};

// ============================================================================
// Managed Process
// ============================================================================

/// One supervised command and its runtime state.
///
/// State machine: `Stopped -(start)-> Active -(kill)-> Stopped`. A process
/// that exits on its own is also `Stopped`; its handle is kept until the
/// next start so that late output can still be drained.
pub struct ManagedProcess {
    spec: ProcessSpec,
    handle: Option<Box<dyn ProcessHandle>>,
    stdout: CaptureBuffer,
    stderr: CaptureBuffer,
}

impl ManagedProcess {
    /// Creates a stopped process.
    pub fn new(spec: ProcessSpec) -> Self {
        Self {
            spec,
            handle: None,
            stdout: CaptureBuffer::default(),
            stderr: CaptureBuffer::default(),
        }
    }

    pub fn name(&self) -> &ProcessName {
        &self.spec.name
    }

    pub fn command(&self) -> &str {
        &self.spec.command
    }

    pub fn spec(&self) -> &ProcessSpec {
        &self.spec
    }

    /// Returns true while the OS process is running.
    pub fn is_active(&mut self) -> bool {
        self.handle.as_mut().is_some_and(|h| h.is_active())
    }

    /// The handle of a running process, `None` once stopped or exited.
    fn active_handle(&mut self) -> Option<&mut Box<dyn ProcessHandle>> {
        match self.handle.as_mut() {
            Some(h) => {
                if h.is_active() {
                    Some(h)
                } else {
                    None
                }
            }
            None => None,
        }
    }

    /// Returns the OS pid while active.
    pub fn pid(&mut self) -> Option<u32> {
        self.active_handle().map(|h| h.pid())
    }

    /// Time since the last (re)start, zero when stopped.
    pub fn uptime(&mut self) -> Duration {
        self.active_handle()
            .map(|h| h.uptime())
            .unwrap_or_else(Duration::zero)
    }

    /// CPU usage sample, zero when stopped.
    pub fn cpu_percent(&mut self) -> f64 {
        self.active_handle().map(|h| h.cpu_percent()).unwrap_or(0.0)
    }

    /// Resident memory sample, zero when stopped.
    pub fn memory_bytes(&mut self) -> f64 {
        self.active_handle().map(|h| h.memory_bytes()).unwrap_or(0.0)
    }

    /// Launches the process, replacing any previous (exited) handle.
    ///
    /// Callers check `is_active` first; starting an active process would
    /// orphan the running one.
    pub fn start(&mut self, spawner: &dyn Spawner) -> Result<u32, ProcessError> {
        // Keep whatever the previous run printed before its handle goes away
        self.collect_output();

        let handle = spawner.spawn(&self.spec.command, &self.spec.workdir)?;
        let pid = handle.pid();
        self.handle = Some(handle);

        info!(name = %self.spec.name, pid = pid, "Process started");
        Ok(pid)
    }

    /// Kills the process if it is running. Returns whether it was.
    pub fn kill(&mut self) -> Result<bool, ProcessError> {
        let Some(handle) = self.handle.as_mut() else {
            return Ok(false);
        };
        if !handle.is_active() {
            return Ok(false);
        }

        let pid = handle.pid();
        handle.kill()?;
        info!(name = %self.spec.name, pid = pid, "Process killed");
        Ok(true)
    }

    /// Kill-if-active then start, without an observable stopped state
    /// in between (the caller holds exclusive access).
    pub fn restart(&mut self, spawner: &dyn Spawner) -> Result<u32, ProcessError> {
        self.kill()?;
        self.start(spawner)
    }

    /// Moves fresh pipe output into the capture buffers.
    ///
    /// Returns the number of new (stdout, stderr) bytes.
    pub fn collect_output(&mut self) -> (usize, usize) {
        let Some(handle) = self.handle.as_mut() else {
            return (0, 0);
        };

        let out = handle.drain_stdout();
        let err = handle.drain_stderr();
        self.stdout.extend(&out);
        self.stderr.extend(&err);

        if !out.is_empty() || !err.is_empty() {
            debug!(
                name = %self.spec.name,
                stdout_bytes = out.len(),
                stderr_bytes = err.len(),
                "Collected process output"
            );
        }
        (out.len(), err.len())
    }

    /// Returns captured output for one stream, including anything not yet
    /// collected by the monitor.
    pub fn output(&mut self, stream: Stream) -> Vec<u8> {
        self.collect_output();
        match stream {
            Stream::Stdout => self.stdout.to_vec(),
            Stream::Stderr => self.stderr.to_vec(),
        }
    }
}

impl std::fmt::Debug for ManagedProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedProcess")
            .field("spec", &self.spec)
            .field("has_handle", &self.handle.is_some())
            .field("stdout_len", &self.stdout.len())
            .field("stderr_len", &self.stderr.len())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Managed processes in insertion order, plus the names enrolled for CPU
/// and memory logging.
///
/// Invariant: `log_cpu` and `log_memory` only ever contain names present in
/// `processes`.
#[derive(Debug, Default)]
pub struct Registry {
    processes: Vec<ManagedProcess>,
    log_cpu: HashSet<ProcessName>,
    log_memory: HashSet<ProcessName>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a process. Returns false, changing nothing, if the name is taken.
    pub fn add(&mut self, process: ManagedProcess, log_cpu: bool, log_memory: bool) -> bool {
        if self.find(process.name().as_str()).is_some() {
            return false;
        }

        let name = process.name().clone();
        if log_cpu {
            self.log_cpu.insert(name.clone());
        }
        if log_memory {
            self.log_memory.insert(name);
        }
        self.processes.push(process);
        true
    }

    /// Removes a process from the registry and both logging sets.
    ///
    /// Does not kill it; that is the caller's job.
    pub fn remove(&mut self, name: &str) -> Option<ManagedProcess> {
        let index = self.processes.iter().position(|p| p.name() == name)?;
        let process = self.processes.remove(index);
        self.log_cpu.remove(process.name());
        self.log_memory.remove(process.name());
        Some(process)
    }

    /// Linear lookup by name.
    pub fn find(&self, name: &str) -> Option<&ManagedProcess> {
        self.processes.iter().find(|p| p.name() == name)
    }

    /// Mutable linear lookup by name.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut ManagedProcess> {
        self.processes.iter_mut().find(|p| p.name() == name)
    }

    /// Returns true if any entry is running.
    pub fn has_active(&mut self) -> bool {
        self.processes.iter_mut().any(ManagedProcess::is_active)
    }

    pub fn logs_cpu(&self, name: &ProcessName) -> bool {
        self.log_cpu.contains(name)
    }

    pub fn logs_memory(&self, name: &ProcessName) -> bool {
        self.log_memory.contains(name)
    }

    /// Names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &ProcessName> {
        self.processes.iter().map(ManagedProcess::name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedProcess> {
        self.processes.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ManagedProcess> {
        self.processes.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Checks the logging-set subset invariant.
    #[cfg(test)]
    pub(crate) fn logging_sets_are_subsets(&self) -> bool {
        self.log_cpu
            .iter()
            .chain(self.log_memory.iter())
            .all(|name| self.find(name.as_str()).is_some())
    }
}
