//! Minimal async client for the control protocol.
//!
//! One request per connection: connect, send the command line, read the
//! reply until the daemon closes the socket.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use pm_protocol::{DecodeError, Request, Response};

/// Bound on connect, send and receive together.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends a typed request to `address` (`host:port`).
pub async fn send_request(address: &str, request: &Request) -> Result<Response, ClientError> {
    send_line(address, &request.to_line()).await
}

/// Sends a raw command line to `address` and decodes the reply.
pub async fn send_line(address: &str, line: &str) -> Result<Response, ClientError> {
    let bytes = send_bytes(address, line.as_bytes()).await?;
    Ok(Response::decode(&bytes)?)
}

/// Sends raw bytes and returns the undecoded reply.
pub async fn send_bytes(address: &str, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
    timeout(CLIENT_TIMEOUT, exchange(address, payload))
        .await
        .map_err(|_| ClientError::Timeout)?
}

async fn exchange(address: &str, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
    let mut stream = TcpStream::connect(address)
        .await
        .map_err(|e| ClientError::Connect {
            address: address.to_string(),
            error: e.to_string(),
        })?;

    stream.write_all(payload).await?;
    stream.flush().await?;

    let mut reply = Vec::new();
    stream.read_to_end(&mut reply).await?;
    debug!(address = %address, bytes = reply.len(), "Received reply");
    Ok(reply)
}

/// Errors that can occur while talking to the daemon.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Couldn't connect to pmd at {address}: {error}")]
    Connect { address: String, error: String },

    #[error("Timed out waiting for pmd")]
    Timeout,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bad reply: {0}")]
    Decode(#[from] DecodeError),
}
