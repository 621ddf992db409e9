//! Protocol decoding errors.
//!
//! Every variant describes a malformed or oversized datagram. Receivers treat
//! all of them the same way: log, drop the datagram, keep running.

use thiserror::Error;

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from encoding or decoding wire messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer is shorter than the fixed frame header.
    #[error("frame too short: {actual} bytes, need at least {expected}")]
    FrameTooShort {
        /// Minimum number of bytes required.
        expected: usize,
        /// Bytes actually received.
        actual: usize,
    },

    /// Declared length claims more bytes than were received.
    #[error("declared frame length {declared} exceeds the {available} bytes received")]
    LengthExceedsBuffer {
        /// Value of the length field.
        declared: usize,
        /// Bytes available after the length field.
        available: usize,
    },

    /// Declared length cannot even cover the rest of the header.
    #[error("declared frame length {0} is smaller than the header")]
    LengthTooSmall(u32),

    /// Bytes follow the declared end of the frame.
    #[error("{0} trailing bytes after frame")]
    TrailingBytes(usize),

    /// Frame type byte is not one we know.
    #[error("unknown frame type: {0:#04x}")]
    UnknownFrameType(u8),

    /// Payload would not fit in a single datagram.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size.
        size: usize,
        /// Maximum accepted size.
        max: usize,
    },

    /// Handshake payload has the wrong size.
    #[error("invalid handshake payload length: {0}")]
    InvalidHandshakeLength(usize),

    /// ACK payload has the wrong size.
    #[error("invalid ack payload length: {0}")]
    InvalidAckLength(usize),

    /// DATA payload is too short to hold a sequence number and a tag.
    #[error("data payload too short: {0} bytes")]
    DataTooShort(usize),

    /// Relay datagram begins with an unknown command byte.
    #[error("unknown relay command: {0:#04x}")]
    UnknownRelayCommand(u8),

    /// Relay datagram ended before the named field.
    #[error("truncated relay message at {0}")]
    TruncatedRelayMessage(&'static str),

    /// Relay datagram has bytes after its last field.
    #[error("{0} trailing bytes after relay message")]
    TrailingRelayBytes(usize),

    /// RELAY command with nothing to forward.
    #[error("relay payload is empty")]
    EmptyRelayPayload,

    /// Fingerprint is not 16 lowercase hex characters.
    #[error("invalid fingerprint")]
    InvalidFingerprint,

    /// A length-prefixed field exceeds its one-byte length.
    #[error("{field} is {len} bytes, max 255")]
    FieldTooLong {
        /// Field name.
        field: &'static str,
        /// Actual length.
        len: usize,
    },

    /// Empty datagram.
    #[error("empty datagram")]
    Empty,
}
