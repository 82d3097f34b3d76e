//! Process registry using Actor pattern.
//!
//! The registry is the single source of truth for managed processes. The
//! connection acceptor and the monitor loop share it, and both only ever
//! talk to it through a `RegistryHandle`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │    Acceptor     │──┐
//! └─────────────────┘  │  RegistryCommand   ┌─────────────────┐     ┌──────────────┐
//!                      ├───────────────────▶│  RegistryActor  │────▶│   Spawner    │
//! ┌─────────────────┐  │   (mpsc channel)   └─────────────────┘     └──────────────┘
//! │  Monitor Loop   │──┘                            │
//! └─────────────────┘                               ▼
//!                                         Vec<ManagedProcess> +
//!                                         log_cpu / log_memory sets
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use std::sync::Arc;

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;
mod store;

pub use actor::RegistryActor;
pub use commands::{
    BulkOutcome, MetricValue, ProcessSample, ProcessView, RegistryCommand, RegistryError,
};
pub use handle::RegistryHandle;
pub use store::{ManagedProcess, Registry};

use crate::process::Spawner;

/// Command channel buffer size
const COMMAND_BUFFER: usize = 100;

/// Spawn the registry actor and return a handle for interaction.
///
/// The actor runs until every handle clone is dropped, then kills any
/// process still running.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use pmd::process::OsSpawner;
/// use pmd::registry::spawn_registry;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_registry(Arc::new(OsSpawner));
///     let processes = handle.list().await;
/// }
/// ```
pub fn spawn_registry(spawner: Arc<dyn Spawner>) -> RegistryHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = RegistryActor::new(cmd_rx, spawner);
    tokio::spawn(actor.run());

    RegistryHandle::new(cmd_tx)
}
