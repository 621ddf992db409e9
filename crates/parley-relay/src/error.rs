//! Relay error types.

use std::fmt;

/// Errors that can stop the relay.
///
/// Per-datagram problems never surface here; they are logged and dropped.
#[derive(Debug)]
pub enum RelayError {
    /// Configuration error
    Config(String),

    /// Socket error
    Transport(std::io::Error),

    /// Internal error
    Internal(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RelayError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err)
    }
}
