//! Daemon configuration.
//!
//! Settings come from built-in defaults, then an optional TOML file, then
//! command-line flags (applied by the binary). A config file looks like:
//!
//! ```toml
//! [daemon]
//! host = "localhost"
//! port = 8080
//! log_dir = "logs"
//! log_frequency = 30
//!
//! [[process]]
//! name = "web"
//! command = "python3 -m http.server 9000"
//! workdir = "/srv/www"
//! log_cpu = true
//! log_memory = true
//! ```
//!
//! `[[process]]` entries are registered on boot and started with the daemon.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use pm_core::{DomainError, ProcessName, ProcessSpec};

use crate::monitor::{DEFAULT_LOG_DIR, DEFAULT_LOG_FREQUENCY};
use crate::server::{DEFAULT_HOST, DEFAULT_PORT};

/// A process registered at boot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProcessConfig {
    pub name: String,
    pub command: String,
    /// Defaults to the daemon's working directory
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    #[serde(default)]
    pub log_cpu: bool,
    #[serde(default)]
    pub log_memory: bool,
}

/// Validated boot entry, ready for `RegistryHandle::add`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootProcess {
    pub spec: ProcessSpec,
    pub log_cpu: bool,
    pub log_memory: bool,
}

/// `[daemon]` table; every key optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DaemonSection {
    host: Option<String>,
    port: Option<u16>,
    log_dir: Option<PathBuf>,
    log_frequency: Option<u32>,
}

/// On-disk layout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    daemon: DaemonSection,
    process: Vec<ProcessConfig>,
}

/// Everything the daemon needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub host: String,
    pub port: u16,
    /// Directory for `<name>_log_cpu` / `<name>_log_mem` files
    pub log_dir: PathBuf,
    /// Monitor samples per minute
    pub log_frequency: u32,
    /// Default workdir for processes that don't set one
    pub workdir: PathBuf,
    pub processes: Vec<ProcessConfig>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            log_frequency: DEFAULT_LOG_FREQUENCY,
            workdir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/")),
            processes: Vec::new(),
        }
    }
}

impl DaemonConfig {
    /// Loads defaults overlaid with the TOML file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml(&text).map_err(|e| match e {
            ConfigError::Parse { error, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                error,
            },
            other => other,
        })
    }

    /// Parses TOML text over the defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: PathBuf::new(),
            error: e.to_string(),
        })?;

        let defaults = Self::default();
        Ok(Self {
            host: file.daemon.host.unwrap_or(defaults.host),
            port: file.daemon.port.unwrap_or(defaults.port),
            log_dir: file.daemon.log_dir.unwrap_or(defaults.log_dir),
            log_frequency: file.daemon.log_frequency.unwrap_or(defaults.log_frequency),
            workdir: defaults.workdir,
            processes: file.process,
        })
    }

    /// Checks settings and turns `[[process]]` entries into specs.
    ///
    /// # Errors
    ///
    /// - `ConfigError::InvalidFrequency` if `log_frequency` is zero
    /// - `ConfigError::InvalidProcess` if a name or command fails the same
    ///   validation `add` applies
    /// - `ConfigError::DuplicateName` if two entries share a name
    pub fn validate(&self) -> Result<Vec<BootProcess>, ConfigError> {
        if self.log_frequency == 0 {
            return Err(ConfigError::InvalidFrequency(self.log_frequency));
        }

        let mut seen = HashSet::new();
        let mut boot = Vec::with_capacity(self.processes.len());

        for entry in &self.processes {
            let invalid = |source| ConfigError::InvalidProcess {
                name: entry.name.clone(),
                source,
            };
            let name = ProcessName::parse(entry.name.as_str()).map_err(invalid)?;
            if !seen.insert(name.clone()) {
                return Err(ConfigError::DuplicateName(entry.name.clone()));
            }
            let workdir = entry.workdir.clone().unwrap_or_else(|| self.workdir.clone());
            let spec = ProcessSpec::new(name, entry.command.as_str(), workdir).map_err(invalid)?;

            boot.push(BootProcess {
                spec,
                log_cpu: entry.log_cpu,
                log_memory: entry.log_memory,
            });
        }

        Ok(boot)
    }

    /// `host:port` as clients dial it.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {error}", path.display())]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config {}: {error}", path.display())]
    Parse { path: PathBuf, error: String },

    #[error("log_frequency must be at least 1 (got {0})")]
    InvalidFrequency(u32),

    #[error("Invalid process '{name}': {source}")]
    InvalidProcess { name: String, source: DomainError },

    #[error("Duplicate process name '{0}'")]
    DuplicateName(String),
}
