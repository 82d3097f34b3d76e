//! pm Core - Shared types for the pm process supervisor
//!
//! This crate provides the domain types shared between the wire
//! protocol (pm-protocol) and the daemon (pmd).
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod name;
pub mod spec;
pub mod uptime;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use name::{ProcessName, MAX_NAME_LEN};
pub use spec::{validate_command, ProcessSpec};
pub use uptime::format_uptime;
