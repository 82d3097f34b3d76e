//! pmd - Process supervisor daemon
//!
//! This crate provides the core infrastructure for the pm daemon:
//! - `process` - Spawner/ProcessHandle capability and its OS implementation
//! - `registry` - Registry actor owning every managed process
//! - `dispatch` - Request execution and wire status wording
//! - `server` - TCP control server, one connection at a time
//! - `monitor` - Periodic sampling and metric log files
//! - `config` - Defaults, TOML config file and validation
//! - `daemon` - Wiring and shutdown sequence
//! - `client` - One-shot async client
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         pmd daemon                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │  DaemonServer   │────▶│     Dispatcher              │   │
//! │  │     (TCP)       │     │  (Request -> Response)      │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │ RegistryHandle    │
//! │  ┌─────────────────┐                    ▼                   │
//! │  │  MonitorLoop    │────▶┌─────────────────────────────┐   │
//! │  │ (sample + logs) │     │     RegistryActor           │   │
//! │  └─────────────────┘     │  (process state owner)      │   │
//! │                          └──────────────┬──────────────┘   │
//! │                                         │ Spawner           │
//! │                                         ▼                   │
//! │                          ┌─────────────────────────────┐   │
//! │                          │   OsProcess (sh -c ...)     │   │
//! │                          └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows this panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod client;
pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod monitor;
pub mod process;
pub mod registry;
pub mod server;

#[cfg(test)]
mod testing;
