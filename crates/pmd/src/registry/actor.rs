//! Registry actor - owns all process state and processes commands.
//!
//! The RegistryActor is the single owner of the registry. The connection
//! acceptor and the monitor loop both reach it through a `RegistryHandle`,
//! so commands and monitor cycles never interleave.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Reply send failures are ignored (the caller went away)

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pm_core::{ProcessName, ProcessSpec};
use pm_protocol::{Metric, Stream};

use super::commands::{
    BulkOutcome, MetricValue, ProcessSample, ProcessView, RegistryCommand, RegistryError,
};
use super::store::{ManagedProcess, Registry};
use crate::process::Spawner;

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all process state.
///
/// Implements the actor pattern: receives commands via mpsc channel and
/// processes them sequentially in a single task.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Managed processes and logging enrollment
    registry: Registry,

    /// Launches processes on start/restart
    spawner: Arc<dyn Spawner>,
}

impl RegistryActor {
    /// Creates a new registry actor with an empty registry.
    pub fn new(receiver: mpsc::Receiver<RegistryCommand>, spawner: Arc<dyn Spawner>) -> Self {
        Self {
            receiver,
            registry: Registry::new(),
            spawner,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped),
    /// then kills anything still running.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        let killed = self.handle_shutdown();
        info!(
            processes = self.registry.len(),
            killed = killed,
            "Registry actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::Add {
                spec,
                log_cpu,
                log_memory,
                respond_to,
            } => {
                let result = self.handle_add(*spec, log_cpu, log_memory);
                // Ignore send error - client may have dropped the receiver
                let _ = respond_to.send(result);
            }
            RegistryCommand::Start { name, respond_to } => {
                let _ = respond_to.send(self.handle_start(&name));
            }
            RegistryCommand::StartAll { respond_to } => {
                let _ = respond_to.send(self.handle_start_all());
            }
            RegistryCommand::Restart { name, respond_to } => {
                let _ = respond_to.send(self.handle_restart(&name));
            }
            RegistryCommand::RestartAll { respond_to } => {
                let _ = respond_to.send(self.handle_restart_all());
            }
            RegistryCommand::Kill { name, respond_to } => {
                let _ = respond_to.send(self.handle_kill(&name));
            }
            RegistryCommand::Remove { name, respond_to } => {
                let _ = respond_to.send(self.handle_remove(&name));
            }
            RegistryCommand::List { respond_to } => {
                let _ = respond_to.send(self.handle_list());
            }
            RegistryCommand::Metrics {
                name,
                metric,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_metrics(name.as_deref(), metric));
            }
            RegistryCommand::Output {
                name,
                stream,
                respond_to,
            } => {
                let _ = respond_to.send(self.handle_output(&name, stream));
            }
            RegistryCommand::Sample { respond_to } => {
                let _ = respond_to.send(self.handle_sample());
            }
            RegistryCommand::HasActive { respond_to } => {
                let _ = respond_to.send(self.registry.has_active());
            }
            RegistryCommand::Shutdown { respond_to } => {
                let _ = respond_to.send(self.handle_shutdown());
            }
        }
    }

    fn find_mut(&mut self, name: &str) -> Result<&mut ManagedProcess, RegistryError> {
        self.registry
            .find_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    fn handle_add(
        &mut self,
        spec: ProcessSpec,
        log_cpu: bool,
        log_memory: bool,
    ) -> Result<(), RegistryError> {
        let name = spec.name.clone();
        if !self
            .registry
            .add(ManagedProcess::new(spec), log_cpu, log_memory)
        {
            return Err(RegistryError::AlreadyExists(name));
        }

        info!(
            name = %name,
            log_cpu = log_cpu,
            log_memory = log_memory,
            total = self.registry.len(),
            "Process registered"
        );
        Ok(())
    }

    fn handle_start(&mut self, name: &str) -> Result<u32, RegistryError> {
        let spawner = Arc::clone(&self.spawner);
        let process = self.find_mut(name)?;
        if process.is_active() {
            return Err(RegistryError::AlreadyActive(name.to_string()));
        }
        Ok(process.start(spawner.as_ref())?)
    }

    fn handle_start_all(&mut self) -> BulkOutcome {
        let total = self.registry.len();
        let mut succeeded = 0;

        for process in self.registry.iter_mut() {
            if process.is_active() {
                continue;
            }
            match process.start(self.spawner.as_ref()) {
                Ok(_) => succeeded += 1,
                Err(e) => warn!(name = %process.name(), error = %e, "Start failed"),
            }
        }

        debug!(succeeded = succeeded, total = total, "Bulk start finished");
        BulkOutcome { succeeded, total }
    }

    fn handle_restart(&mut self, name: &str) -> Result<u32, RegistryError> {
        let spawner = Arc::clone(&self.spawner);
        let process = self.find_mut(name)?;
        Ok(process.restart(spawner.as_ref())?)
    }

    fn handle_restart_all(&mut self) -> BulkOutcome {
        let total = self.registry.len();
        let mut succeeded = 0;

        for process in self.registry.iter_mut() {
            match process.restart(self.spawner.as_ref()) {
                Ok(_) => succeeded += 1,
                Err(e) => warn!(name = %process.name(), error = %e, "Restart failed"),
            }
        }

        debug!(succeeded = succeeded, total = total, "Bulk restart finished");
        BulkOutcome { succeeded, total }
    }

    fn handle_kill(&mut self, name: &str) -> Result<(), RegistryError> {
        let process = self.find_mut(name)?;
        if process.kill()? {
            Ok(())
        } else {
            Err(RegistryError::NotActive(name.to_string()))
        }
    }

    fn handle_remove(&mut self, name: &str) -> Result<(), RegistryError> {
        self.find_mut(name)?.kill()?;

        if self.registry.remove(name).is_some() {
            info!(name = %name, total = self.registry.len(), "Process removed");
        }
        Ok(())
    }

    fn handle_list(&mut self) -> Vec<ProcessView> {
        self.registry
            .iter_mut()
            .map(|process| ProcessView {
                name: process.name().clone(),
                command: process.command().to_string(),
                pid: process.pid(),
            })
            .collect()
    }

    fn handle_metrics(
        &mut self,
        name: Option<&str>,
        metric: Metric,
    ) -> Result<Vec<(ProcessName, MetricValue)>, RegistryError> {
        let read = |process: &mut ManagedProcess| {
            let value = match metric {
                Metric::Memory => MetricValue::Memory(process.memory_bytes()),
                Metric::Cpu => MetricValue::Cpu(process.cpu_percent()),
                Metric::Pid => MetricValue::Pid(process.pid()),
                Metric::Uptime => MetricValue::Uptime(process.uptime()),
            };
            (process.name().clone(), value)
        };

        match name {
            Some(name) => Ok(vec![read(self.find_mut(name)?)]),
            None => Ok(self.registry.iter_mut().map(read).collect()),
        }
    }

    fn handle_output(&mut self, name: &str, stream: Stream) -> Result<Vec<u8>, RegistryError> {
        Ok(self.find_mut(name)?.output(stream))
    }

    fn handle_sample(&mut self) -> Vec<ProcessSample> {
        let mut samples = Vec::with_capacity(self.registry.len());
        let enrollment: Vec<(bool, bool)> = self
            .registry
            .iter()
            .map(|p| (self.registry.logs_cpu(p.name()), self.registry.logs_memory(p.name())))
            .collect();

        for (process, (logs_cpu, logs_memory)) in self.registry.iter_mut().zip(enrollment) {
            let memory = logs_memory.then(|| process.memory_bytes());
            let cpu = logs_cpu.then(|| process.cpu_percent());
            let (stdout_bytes, stderr_bytes) = if process.is_active() {
                process.collect_output()
            } else {
                (0, 0)
            };

            samples.push(ProcessSample {
                name: process.name().clone(),
                cpu,
                memory,
                stdout_bytes,
                stderr_bytes,
            });
        }
        samples
    }

    fn handle_shutdown(&mut self) -> usize {
        let mut killed = 0;
        for process in self.registry.iter_mut() {
            match process.kill() {
                Ok(true) => killed += 1,
                Ok(false) => {}
                Err(e) => warn!(name = %process.name(), error = %e, "Kill during shutdown failed"),
            }
        }
        killed
    }
}
