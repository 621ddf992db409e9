//! Typed payloads carried inside frames.
//!
//! Each payload maps to exactly one [`FrameType`](crate::FrameType):
//!
//! - [`handshake::HandshakeInit`]: `HANDSHAKE`
//! - [`handshake::HandshakeAck`]: `ACK`
//! - [`data::SealedData`]: `DATA`
//!
//! `GOODBYE` has no payload.

pub mod data;
pub mod handshake;
