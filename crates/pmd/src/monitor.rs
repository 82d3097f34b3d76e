//! Periodic monitor cycle for managed processes.
//!
//! Every `60 / log_frequency` seconds the loop asks the registry for one
//! sample pass, which drains process pipes into their capture buffers, then
//! appends the enrolled metrics to per-process log files:
//!
//! ```text
//! <log_dir>/<name>_log_cpu    f64-le CPU percent, one per cycle
//! <log_dir>/<name>_log_mem    f64-le resident bytes, one per cycle
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All code follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Log write failures are warned about and the loop keeps running

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use pm_core::ProcessName;

use crate::registry::{ProcessSample, RegistryHandle};

/// Default samples per minute.
pub const DEFAULT_LOG_FREQUENCY: u32 = 30;

/// Default log directory, relative to the daemon's working directory.
pub const DEFAULT_LOG_DIR: &str = "logs";

const CPU_LOG_SUFFIX: &str = "_log_cpu";
const MEMORY_LOG_SUFFIX: &str = "_log_mem";

/// Time between monitor cycles for a sampling frequency in samples/minute.
///
/// A frequency of zero is treated as one.
pub fn log_period(log_frequency: u32) -> Duration {
    Duration::from_secs_f64(60.0 / f64::from(log_frequency.max(1)))
}

// ============================================================================
// Metric Logs
// ============================================================================

/// Which per-process log file a sample goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricLog {
    Cpu,
    Memory,
}

impl MetricLog {
    /// Log file path for `name` under `log_dir`.
    pub fn path(self, log_dir: &Path, name: &ProcessName) -> PathBuf {
        let suffix = match self {
            Self::Cpu => CPU_LOG_SUFFIX,
            Self::Memory => MEMORY_LOG_SUFFIX,
        };
        log_dir.join(format!("{name}{suffix}"))
    }

    /// Appends one little-endian `f64` sample.
    pub async fn append(self, log_dir: &Path, name: &ProcessName, value: f64) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(log_dir, name))
            .await?;
        file.write_all(&value.to_le_bytes()).await?;
        file.flush().await
    }
}

/// Reads a metric log back into samples. Trailing partial records are ignored.
pub async fn read_metric_log(path: &Path) -> io::Result<Vec<f64>> {
    let bytes = fs::read(path).await?;
    Ok(bytes
        .chunks_exact(8)
        .filter_map(|chunk| <[u8; 8]>::try_from(chunk).ok())
        .map(f64::from_le_bytes)
        .collect())
}

// ============================================================================
// Monitor Loop
// ============================================================================

/// The supervisory sampling loop.
pub struct MonitorLoop {
    registry: RegistryHandle,
    log_dir: PathBuf,
    period: Duration,
}

impl MonitorLoop {
    pub fn new(registry: RegistryHandle, log_dir: impl Into<PathBuf>, log_frequency: u32) -> Self {
        Self {
            registry,
            log_dir: log_dir.into(),
            period: log_period(log_frequency),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Runs cycles until cancelled or the registry goes away.
    ///
    /// The first cycle runs one full period after the call. Returns the
    /// number of completed cycles.
    pub async fn run(self, cancel_token: CancellationToken) -> u64 {
        if let Err(e) = fs::create_dir_all(&self.log_dir).await {
            warn!(log_dir = %self.log_dir.display(), error = %e, "Failed to create log directory");
        }

        let mut tick = interval_at(Instant::now() + self.period, self.period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        info!(
            log_dir = %self.log_dir.display(),
            period_ms = self.period.as_millis() as u64,
            "Monitor loop started"
        );

        loop {
            tokio::select! {
                biased;

                _ = cancel_token.cancelled() => {
                    info!("Monitor loop shutting down");
                    break;
                }

                _ = tick.tick() => {
                    match self.registry.sample().await {
                        Ok(samples) => {
                            self.record(&samples).await;
                            cycles += 1;
                        }
                        Err(e) => {
                            warn!(error = %e, "Registry unavailable, stopping monitor loop");
                            break;
                        }
                    }
                }
            }
        }

        debug!(cycles = cycles, "Monitor loop completed");
        cycles
    }

    /// Appends one cycle's samples to the log files.
    async fn record(&self, samples: &[ProcessSample]) {
        for sample in samples {
            if let Some(memory) = sample.memory {
                self.append(MetricLog::Memory, &sample.name, memory).await;
            }
            if let Some(cpu) = sample.cpu {
                self.append(MetricLog::Cpu, &sample.name, cpu).await;
            }
            if sample.stdout_bytes > 0 || sample.stderr_bytes > 0 {
                debug!(
                    name = %sample.name,
                    stdout_bytes = sample.stdout_bytes,
                    stderr_bytes = sample.stderr_bytes,
                    "Captured output"
                );
            }
        }
    }

    async fn append(&self, log: MetricLog, name: &ProcessName, value: f64) {
        if let Err(e) = log.append(&self.log_dir, name, value).await {
            warn!(name = %name, log = ?log, error = %e, "Failed to append metric sample");
        }
    }
}
