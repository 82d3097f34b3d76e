//! TCP control server for the pmd daemon.
//!
//! The server:
//! - Binds one TCP listener for the daemon's lifetime
//! - Handles accepted connections one at a time, to completion
//! - Cancels the shared token when a client sends `stop`
//! - Stops accepting as soon as the token is cancelled
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   DaemonServer  │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ConnectionHandler│────▶│   Dispatcher    │────▶│  RegistryHandle │
//! │ (one at a time) │     │                 │     │                 │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod connection;

pub use connection::{ConnectionError, ConnectionHandler, READ_BUFFER_SIZE};

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::dispatch::Dispatcher;

/// Default listening port
pub const DEFAULT_PORT: u16 = 8080;

/// Default listening host
pub const DEFAULT_HOST: &str = "localhost";

/// TCP server for the pmd daemon.
pub struct DaemonServer {
    listener: TcpListener,

    /// Address the listener actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Executes decoded requests
    dispatcher: Dispatcher,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl DaemonServer {
    /// Binds the listening socket.
    ///
    /// The `stop` reply quotes `host` and the bound port.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Bind` if the address is unavailable; the daemon
    /// treats this as fatal.
    pub async fn bind(
        host: &str,
        port: u16,
        mut dispatcher: Dispatcher,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let bind_error = |e: std::io::Error| ServerError::Bind {
            address: format!("{host}:{port}"),
            error: e.to_string(),
        };

        let listener = TcpListener::bind((host, port)).await.map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;
        dispatcher.set_address(format!("{host}:{}", local_addr.port()));

        info!(address = %local_addr, "Daemon server listening");

        Ok(Self {
            listener,
            local_addr,
            dispatcher,
            cancel_token,
        })
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop.
    ///
    /// Listens for connections until the cancellation token is triggered,
    /// either externally or by a `stop` request. Dropping the server
    /// afterwards closes the listening socket.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut connection_number: u64 = 0;

        loop {
            tokio::select! {
                // Check for cancellation
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                // Accept new connection
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            connection_number += 1;
                            let handler = ConnectionHandler::new(
                                stream,
                                peer,
                                &self.dispatcher,
                                connection_number,
                            );
                            if handler.run().await {
                                info!(peer = %peer, "Stop requested by client");
                                self.cancel_token.cancel();
                                break;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        info!(connections = connection_number, "Server stopped");
        Ok(())
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {address}: {error}")]
    Bind { address: String, error: String },
}
