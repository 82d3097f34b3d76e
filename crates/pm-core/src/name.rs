//! Validated process names.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Maximum length of a process name, in characters.
pub const MAX_NAME_LEN: usize = 16;

/// Unique identifier of a managed process.
///
/// A name is identifier-shaped: it starts with a letter or `_` and
/// continues with letters, digits or `_`. It is at most
/// [`MAX_NAME_LEN`] characters long and never changes once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProcessName(String);

impl ProcessName {
    /// Validates and wraps a process name.
    ///
    /// The length check runs first, so an over-long name reports
    /// `NameTooLong` even if it is also malformed.
    pub fn parse(name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();

        if name.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::NameTooLong { name });
        }

        if !is_identifier(&name) {
            return Err(DomainError::InvalidName { name });
        }

        Ok(Self(name))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name as raw bytes for wire encoding.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) if first == '_' || first.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

impl fmt::Display for ProcessName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProcessName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProcessName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ProcessName> for String {
    fn from(name: ProcessName) -> Self {
        name.0
    }
}

impl PartialEq<str> for ProcessName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ProcessName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
