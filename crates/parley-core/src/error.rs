//! Error types for session state and persistent stores.

use std::{io, path::PathBuf};

use parley_crypto::CryptoError;
use parley_proto::{ConnectionId, ProtocolError};
use thiserror::Error;

/// Errors from the session table.
#[derive(Debug, Error)]
pub enum SessionError {
    /// No session with this connection id.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Connection id already registered.
    #[error("connection {0} already in use")]
    DuplicateConnection(ConnectionId),

    /// Data arrived for, or was sent on, a session still waiting for its ACK.
    #[error("session {0} not established")]
    NotEstablished(ConnectionId),

    /// The send sequence space is used up; the session must be replaced.
    #[error("sequence space exhausted on {0}")]
    SequenceExhausted(ConnectionId),

    /// Sequence number below the receive window (replay or reordering).
    #[error("stale sequence {sequence}, expected at least {expected}")]
    StaleSequence {
        /// Sequence carried by the frame.
        sequence: u64,
        /// Lowest sequence still acceptable.
        expected: u64,
    },

    /// AEAD failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Malformed payload.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Errors from JSON-backed stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },

    /// Serialization failure.
    #[error("serialization error on {path}: {source}")]
    Json {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: serde_json::Error,
    },
}

/// Errors loading or creating the local identity.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The data directory or key file could not be created or written.
    #[error("cannot persist identity at {path}: {source}")]
    Persist {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}
