//! Definition of a supervised command.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::name::ProcessName;

/// Everything needed to (re)launch a managed process.
///
/// The spec is immutable; runtime state (the OS handle, captured output)
/// lives with the daemon's registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessSpec {
    /// Unique registry key
    pub name: ProcessName,

    /// Shell command line executed via `sh -c`
    pub command: String,

    /// Directory the process runs in
    pub workdir: PathBuf,
}

impl ProcessSpec {
    /// Creates a spec after validating the command text.
    pub fn new(
        name: ProcessName,
        command: impl Into<String>,
        workdir: impl Into<PathBuf>,
    ) -> DomainResult<Self> {
        let command = command.into();
        validate_command(&command)?;

        Ok(Self {
            name,
            command,
            workdir: workdir.into(),
        })
    }

    /// Returns the working directory.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }
}

/// Checks that a command line is non-empty printable text.
///
/// Spaces are printable; tabs, newlines and other control characters are not.
pub fn validate_command(command: &str) -> DomainResult<()> {
    if command.trim().is_empty() || command.chars().any(char::is_control) {
        return Err(DomainError::InvalidCommand {
            command: command.to_string(),
        });
    }
    Ok(())
}
