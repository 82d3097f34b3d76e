//! Connection handler for a single client request.
//!
//! Each accepted connection carries exactly one exchange:
//! - One bounded read of the command line
//! - Dispatch against the registry
//! - One response write, then close
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::dispatch::Dispatcher;

/// Size of the single request read; longer requests are truncated.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Read timeout for a client that connects but never sends
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Write timeout (10 seconds)
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Handles one client connection to completion.
pub struct ConnectionHandler<'a> {
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &'a Dispatcher,
    connection_number: u64,
}

impl<'a> ConnectionHandler<'a> {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        dispatcher: &'a Dispatcher,
        connection_number: u64,
    ) -> Self {
        Self {
            stream,
            peer,
            dispatcher,
            connection_number,
        }
    }

    /// Runs the exchange. Returns true if the client asked the daemon to stop.
    ///
    /// The stop request is honored even if its reply can't be delivered.
    pub async fn run(mut self) -> bool {
        let request = match self.read_request().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(conn = self.connection_number, peer = %self.peer, "Client closed without a request");
                return false;
            }
            Err(e) => {
                log_connection_error(self.connection_number, &e, "Failed to read request");
                return false;
            }
        };

        let outcome = self.dispatcher.dispatch_bytes(&request).await;

        if let Err(e) = self.write_response(&outcome.response.encode()).await {
            log_connection_error(self.connection_number, &e, "Failed to write response");
        }

        debug!(
            conn = self.connection_number,
            peer = %self.peer,
            shutdown = outcome.shutdown,
            "Connection finished"
        );
        outcome.shutdown
    }

    /// Reads once into the bounded buffer.
    async fn read_request(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let n = timeout(READ_TIMEOUT, self.stream.read(&mut buf))
            .await
            .map_err(|_| ConnectionError::ReadTimeout)??;

        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(buf))
    }

    async fn write_response(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        timeout(WRITE_TIMEOUT, async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await?;
            self.stream.shutdown().await
        })
        .await
        .map_err(|_| ConnectionError::WriteTimeout)??;
        Ok(())
    }
}

/// Resets and broken pipes are routine; everything else is worth a warning.
fn log_connection_error(conn: u64, err: &ConnectionError, msg: &str) {
    if err.is_disconnect() {
        debug!(conn = conn, error = %err, "{msg}");
    } else {
        warn!(conn = conn, error = %err, "{msg}");
    }
}

/// Errors that can occur in connection handling.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Read timeout")]
    ReadTimeout,

    #[error("Write timeout")]
    WriteTimeout,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ConnectionError {
    /// Returns true if the peer went away mid-exchange.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io(e) if matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let reset = ConnectionError::Io(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(reset.is_disconnect());

        let pipe = ConnectionError::Io(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(pipe.is_disconnect());

        assert!(!ConnectionError::ReadTimeout.is_disconnect());
        let denied = ConnectionError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!denied.is_disconnect());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(ConnectionError::WriteTimeout.to_string(), "Write timeout");
        let err = ConnectionError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert!(err.to_string().contains("boom"));
    }
}
