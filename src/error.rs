//! Error types for swapcache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
///
/// Absence of a key or field is never an error; accessors report it as
/// `Ok(None)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An outgoing value could not be serialized
    Encode,
    /// Stored bytes could not be deserialized into the requested type
    Decode,
    /// Transport, protocol, server or deadline failure from the store
    Store,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Encode => write!(f, "encode"),
            ErrorKind::Decode => write!(f, "decode"),
            ErrorKind::Store => write!(f, "store"),
        }
    }
}

/// Errors returned by the cache layer and its store adapters
#[derive(Error, Debug)]
pub enum Error {
    /// Value serialization failed; nothing was written
    #[error("Failed to encode value: {0}")]
    Encode(#[source] serde_json::Error),

    /// Stored bytes are not a valid encoding of the requested type
    #[error("Failed to decode value stored at {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Stored bytes are not valid UTF-8 where a string was requested
    #[error("Value stored at {key} is not valid UTF-8")]
    InvalidUtf8 { key: String },

    /// Store replied with an error
    #[error("Store command {command} failed: {message}")]
    Store { command: String, message: String },

    /// Operation deadline elapsed
    #[error("{operation} timed out after {budget:?}")]
    Timeout {
        operation: &'static str,
        budget: Duration,
    },

    /// I/O error talking to the store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unexpected reply from the store
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Store error raised by a named command.
    pub fn store(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Encode(_) => ErrorKind::Encode,
            Error::Decode { .. } | Error::InvalidUtf8 { .. } => ErrorKind::Decode,
            Error::Store { .. } | Error::Timeout { .. } | Error::Io(_) | Error::Protocol(_) => {
                ErrorKind::Store
            }
        }
    }

    /// Returns true if the operation's deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }
}
