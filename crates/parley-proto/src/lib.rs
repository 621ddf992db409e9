//! Parley wire formats.
//!
//! Everything that crosses a socket is defined here: the client-to-client
//! [`Frame`], the payloads carried inside frames, and the relay
//! request/response codec. This crate performs no I/O and no cryptography;
//! it only validates and (de)serializes bytes.
//!
//! # Layering
//!
//! ```text
//! UDP datagram
//!   ├─ direct:  Frame
//!   └─ relayed: RelayRequest::Relay { destination, payload: Frame }
//!                  │
//!                  ▼ (relay forwards payload verbatim)
//!               Frame
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod fingerprint;
pub mod frame;
pub mod payloads;
pub mod relay;

pub use errors::{ProtocolError, Result};
pub use fingerprint::{FINGERPRINT_LEN, Fingerprint};
pub use frame::{ConnectionId, Frame, FrameHeader, FrameType};
pub use payloads::{
    data::SealedData,
    handshake::{ACK_TAG_SIZE, HandshakeAck, HandshakeInit},
};
pub use relay::{PeerEntry, RelayRequest, RelayResponse};

/// Largest UDP payload deliverable over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;
