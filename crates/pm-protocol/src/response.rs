//! Tagged daemon responses.
//!
//! The first byte of every response tells the client how to read the rest:
//!
//! ```text
//! 0x00 <utf-8 status text>      "Error: ..." / "Warning: ..." / anything else = success
//! 0x01 <structured payload>     records, see `crate::record`
//! ```

use std::fmt;

use thiserror::Error;

/// Tag byte for human-readable status text.
pub const STATUS_TAG: u8 = 0x00;

/// Tag byte for structured data.
pub const DATA_TAG: u8 = 0x01;

/// Prefix marking an error status.
pub const ERROR_PREFIX: &str = "Error:";

/// Prefix marking a warning status.
pub const WARNING_PREFIX: &str = "Warning:";

/// Severity of a status response, derived from its text prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A single reply from the daemon.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Human-readable status message
    Status(String),
    /// Structured payload (records or raw captured output)
    Data(Vec<u8>),
}

impl Response {
    /// Creates a success status.
    pub fn success(text: impl Into<String>) -> Self {
        Self::Status(text.into())
    }

    /// Creates a `Warning: ` status.
    pub fn warning(text: impl fmt::Display) -> Self {
        Self::Status(format!("{WARNING_PREFIX} {text}"))
    }

    /// Creates an `Error: ` status.
    pub fn error(text: impl fmt::Display) -> Self {
        Self::Status(format!("{ERROR_PREFIX} {text}"))
    }

    /// Creates the not-found error the client pattern-matches on.
    pub fn not_found(name: &str) -> Self {
        Self::error(format!("Couldn't find process '{name}'"))
    }

    /// Creates a data response.
    pub fn data(payload: impl Into<Vec<u8>>) -> Self {
        Self::Data(payload.into())
    }

    /// Returns the severity of a status response, `None` for data.
    pub fn severity(&self) -> Option<Severity> {
        match self {
            Self::Status(text) if text.starts_with(ERROR_PREFIX) => Some(Severity::Error),
            Self::Status(text) if text.starts_with(WARNING_PREFIX) => Some(Severity::Warning),
            Self::Status(_) => Some(Severity::Success),
            Self::Data(_) => None,
        }
    }

    /// Returns true for `Error: ` status responses.
    pub fn is_error(&self) -> bool {
        self.severity() == Some(Severity::Error)
    }

    /// Returns the status text, if this is a status response.
    pub fn as_status(&self) -> Option<&str> {
        match self {
            Self::Status(text) => Some(text),
            Self::Data(_) => None,
        }
    }

    /// Returns the payload, if this is a data response.
    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Status(_) => None,
            Self::Data(payload) => Some(payload),
        }
    }

    /// Encodes the response for the wire.
    pub fn encode(&self) -> Vec<u8> {
        let (tag, body) = match self {
            Self::Status(text) => (STATUS_TAG, text.as_bytes()),
            Self::Data(payload) => (DATA_TAG, payload.as_slice()),
        };
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(tag);
        out.extend_from_slice(body);
        out
    }

    /// Decodes a complete response.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let (tag, body) = bytes.split_first().ok_or(DecodeError::Empty)?;

        match *tag {
            STATUS_TAG => {
                let text = std::str::from_utf8(body).map_err(|_| DecodeError::InvalidUtf8)?;
                Ok(Self::Status(text.to_string()))
            }
            DATA_TAG => Ok(Self::Data(body.to_vec())),
            other => Err(DecodeError::UnknownTag(other)),
        }
    }
}

/// Errors produced while decoding responses and record payloads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty response")]
    Empty,

    #[error("unknown response tag: {0:#04x}")]
    UnknownTag(u8),

    #[error("invalid UTF-8 in text field")]
    InvalidUtf8,

    #[error("record truncated at byte {offset}")]
    Truncated { offset: usize },
}
