//! Real child processes via `tokio::process` and `sysinfo`.

use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{ProcessError, ProcessHandle, Spawner};

/// Upper bound on undrained pipe output held per stream.
const MAX_PENDING_BYTES: usize = 1024 * 1024;

/// Read chunk size for pipe copies.
const READ_CHUNK: usize = 4096;

/// Polls for the exit status after SIGKILL before leaving the reap to `is_active`.
const REAP_ATTEMPTS: u32 = 50;
const REAP_INTERVAL: std::time::Duration = std::time::Duration::from_millis(2);

/// Bytes read from a pipe but not yet drained.
type Pending = Arc<Mutex<Vec<u8>>>;

/// Spawns commands through `sh -c`, each in its own process group.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    fn spawn(&self, command: &str, workdir: &Path) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::Spawn {
                command: command.to_string(),
                error: e.to_string(),
            })?;

        let pid = child.id().ok_or_else(|| ProcessError::Spawn {
            command: command.to_string(),
            error: "process exited before its pid was read".to_string(),
        })?;

        let stdout = Pending::default();
        let stderr = Pending::default();
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(spawn_pipe_reader(pipe, Arc::clone(&stdout)));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(spawn_pipe_reader(pipe, Arc::clone(&stderr)));
        }

        debug!(pid = pid, command = %command, workdir = %workdir.display(), "Spawned process");

        Ok(Box::new(OsProcess {
            child,
            pid,
            started_at: Utc::now(),
            system: System::new(),
            stdout,
            stderr,
            readers,
            killed: false,
        }))
    }
}

/// Copies a pipe into a pending buffer until EOF.
fn spawn_pipe_reader<R>(mut pipe: R, pending: Pending) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match pipe.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    let mut buf = pending.lock().unwrap_or_else(|p| p.into_inner());
                    buf.extend_from_slice(chunk.get(..n).unwrap_or_default());
                    let overflow = buf.len().saturating_sub(MAX_PENDING_BYTES);
                    if overflow > 0 {
                        buf.drain(..overflow);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Pipe read failed");
                    break;
                }
            }
        }
    })
}

fn take_pending(pending: &Pending) -> Vec<u8> {
    let mut buf = pending.lock().unwrap_or_else(|p| p.into_inner());
    std::mem::take(&mut *buf)
}

/// A child process spawned by [`OsSpawner`].
pub struct OsProcess {
    child: Child,
    pid: u32,
    started_at: DateTime<Utc>,
    system: System,
    stdout: Pending,
    stderr: Pending,
    readers: Vec<JoinHandle<()>>,
    killed: bool,
}

impl OsProcess {
    /// Refreshes sysinfo for this pid and returns its process entry.
    fn refresh(&mut self) -> Option<&sysinfo::Process> {
        let pid = Pid::from_u32(self.pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid)
    }
}

impl ProcessHandle for OsProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_active(&mut self) -> bool {
        // try_wait also reaps a killed child whose exit was not yet visible
        let running = matches!(self.child.try_wait(), Ok(None));
        running && !self.killed
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        let pgid = libc::pid_t::try_from(self.pid).map_err(|e| ProcessError::Kill {
            pid: self.pid,
            error: e.to_string(),
        })?;

        // SAFETY: killpg only sends a signal; the group id came from our own child.
        let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if result != 0 {
            let group_error = std::io::Error::last_os_error();
            warn!(pid = self.pid, error = %group_error, "killpg failed, killing leader only");
            self.child.start_kill().map_err(|e| ProcessError::Kill {
                pid: self.pid,
                error: e.to_string(),
            })?;
        }

        self.killed = true;
        for _ in 0..REAP_ATTEMPTS {
            if !matches!(self.child.try_wait(), Ok(None)) {
                return Ok(());
            }
            std::thread::sleep(REAP_INTERVAL);
        }
        debug!(pid = self.pid, "Killed process not reaped yet");
        Ok(())
    }

    fn uptime(&self) -> Duration {
        Utc::now().signed_duration_since(self.started_at)
    }

    fn cpu_percent(&mut self) -> f64 {
        // Process CPU% is relative to global CPU time, which a per-pid
        // refresh alone doesn't update
        self.system.refresh_cpu_usage();
        self.refresh().map(|p| f64::from(p.cpu_usage())).unwrap_or(0.0)
    }

    fn memory_bytes(&mut self) -> f64 {
        // u64 -> f64 is exact below 2^53 bytes
        self.refresh().map(|p| p.memory() as f64).unwrap_or(0.0)
    }

    fn drain_stdout(&mut self) -> Vec<u8> {
        take_pending(&self.stdout)
    }

    fn drain_stderr(&mut self) -> Vec<u8> {
        take_pending(&self.stderr)
    }
}

impl Drop for OsProcess {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
    }
}
