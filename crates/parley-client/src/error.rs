//! Client error types.

use parley_core::{IdentityError, SessionError};
use parley_crypto::HandshakeError;
use parley_proto::{Fingerprint, ProtocolError};
use thiserror::Error;

/// Errors from messenger and runtime operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Inbound datagram did not parse.
    #[error("malformed datagram: {0}")]
    Protocol(#[from] ProtocolError),

    /// Inbound handshake failed to authenticate.
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    /// Session lookup, sealing or opening failed.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// No peer matches the given name or fingerprint.
    #[error("unknown peer: {0}")]
    UnknownPeer(String),

    /// Decrypted message text is not UTF-8.
    #[error("message from {0} is not valid UTF-8")]
    InvalidText(Fingerprint),

    /// Peer is only reachable through a relay and none is configured.
    #[error("no route to {0}: relay not configured")]
    NoRoute(Fingerprint),

    /// Message does not fit in one datagram.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge {
        /// Message size in bytes.
        size: usize,
        /// Largest accepted message.
        max: usize,
    },

    /// Identity could not be loaded or created.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The runtime has stopped.
    #[error("client runtime stopped")]
    Stopped,
}

impl ClientError {
    /// Returns true if the error concerns a single inbound datagram.
    ///
    /// Droppable errors are logged at debug level and the datagram is
    /// discarded without a reply. Everything else is reported to the caller.
    pub fn is_droppable(&self) -> bool {
        match self {
            Self::Protocol(_) | Self::Handshake(_) | Self::Session(_) | Self::InvalidText(_) => {
                true
            },

            Self::UnknownPeer(_)
            | Self::NoRoute(_)
            | Self::MessageTooLarge { .. }
            | Self::Identity(_)
            | Self::Io(_)
            | Self::Stopped => false,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use parley_proto::ConnectionId;

    use super::*;

    #[test]
    fn malformed_input_is_droppable() {
        assert!(ClientError::Protocol(ProtocolError::Empty).is_droppable());
        assert!(ClientError::Handshake(HandshakeError::DecryptionFailed).is_droppable());
        assert!(
            ClientError::Session(SessionError::UnknownConnection(ConnectionId(1))).is_droppable()
        );
        let fp = Fingerprint::parse("0123456789abcdef").unwrap();
        assert!(ClientError::InvalidText(fp).is_droppable());
    }

    #[test]
    fn user_errors_propagate() {
        assert!(!ClientError::UnknownPeer("bob".into()).is_droppable());
        assert!(!ClientError::MessageTooLarge { size: 10, max: 5 }.is_droppable());
    }

    #[test]
    fn error_display() {
        let err = ClientError::MessageTooLarge { size: 70_000, max: 65_000 };
        assert_eq!(err.to_string(), "message too large: 70000 bytes (max 65000)");

        let fp = Fingerprint::parse("0123456789abcdef").unwrap();
        assert_eq!(
            ClientError::InvalidText(fp).to_string(),
            "message from 0123456789abcdef is not valid UTF-8"
        );
    }
}
