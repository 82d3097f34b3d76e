//! Domain-specific error types following panic-free policy.
//!
//! The `Display` text of each variant is what the daemon puts on the wire
//! after the `Error: ` prefix, so the wording is part of the client contract.

use thiserror::Error;

use crate::name::MAX_NAME_LEN;

/// Errors that can occur while validating process definitions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Name is longer than [`MAX_NAME_LEN`] characters
    #[error("Name can't be over {MAX_NAME_LEN} characters long")]
    NameTooLong { name: String },

    /// Name is empty or not identifier-shaped
    #[error("Invalid name")]
    InvalidName { name: String },

    /// Command is empty or contains non-printable characters
    #[error("Invalid command")]
    InvalidCommand { command: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
