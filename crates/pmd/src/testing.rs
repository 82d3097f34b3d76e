//! In-memory `Spawner` for unit tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Duration;

use crate::process::{ProcessError, ProcessHandle, Spawner};

/// CPU reported by every fake process.
pub const FAKE_CPU: f64 = 12.5;

/// Memory reported by every fake process.
pub const FAKE_MEMORY: f64 = 4096.0;

/// Uptime reported by every fake process.
pub const FAKE_UPTIME_SECS: i64 = 3725;

#[derive(Default)]
struct FakeState {
    next_pid: u32,
    spawns: Vec<(String, PathBuf)>,
    fail_next: usize,
    killed: Vec<u32>,
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

/// Spawner whose processes run until killed and print only what the test
/// emits through it. Emitted output goes to the most recent spawn.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    state: Arc<Mutex<FakeState>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` spawns fail.
    pub fn fail_next_spawns(&self, count: usize) {
        self.state.lock().unwrap().fail_next = count;
    }

    pub fn spawn_count(&self) -> usize {
        self.state.lock().unwrap().spawns.len()
    }

    /// Working directory of the most recent spawn.
    pub fn last_workdir(&self) -> Option<PathBuf> {
        self.state.lock().unwrap().spawns.last().map(|(_, dir)| dir.clone())
    }

    pub fn killed_pids(&self) -> Vec<u32> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn emit_stdout(&self, bytes: &[u8]) {
        let state = self.state.lock().unwrap();
        state.stdout.lock().unwrap().extend_from_slice(bytes);
    }

    pub fn emit_stderr(&self, bytes: &[u8]) {
        let state = self.state.lock().unwrap();
        state.stderr.lock().unwrap().extend_from_slice(bytes);
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, command: &str, workdir: &Path) -> Result<Box<dyn ProcessHandle>, ProcessError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(ProcessError::Spawn {
                command: command.to_string(),
                error: "injected failure".to_string(),
            });
        }

        state.next_pid += 1;
        state.spawns.push((command.to_string(), workdir.to_path_buf()));
        state.stdout = Arc::default();
        state.stderr = Arc::default();

        Ok(Box::new(FakeProcess {
            pid: 1000 + state.next_pid,
            active: true,
            owner: Arc::clone(&self.state),
            stdout: Arc::clone(&state.stdout),
            stderr: Arc::clone(&state.stderr),
        }))
    }
}

struct FakeProcess {
    pid: u32,
    active: bool,
    owner: Arc<Mutex<FakeState>>,
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

impl ProcessHandle for FakeProcess {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_active(&mut self) -> bool {
        self.active
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        self.active = false;
        self.owner.lock().unwrap().killed.push(self.pid);
        Ok(())
    }

    fn uptime(&self) -> Duration {
        Duration::seconds(FAKE_UPTIME_SECS)
    }

    fn cpu_percent(&mut self) -> f64 {
        FAKE_CPU
    }

    fn memory_bytes(&mut self) -> f64 {
        FAKE_MEMORY
    }

    fn drain_stdout(&mut self) -> Vec<u8> {
        std::mem::take(&mut *self.stdout.lock().unwrap())
    }

    fn drain_stderr(&mut self) -> Vec<u8> {
        std::mem::take(&mut *self.stderr.lock().unwrap())
    }
}
