//! Client-to-client frame format.
//!
//! Every datagram between two endpoints, direct or forwarded by a relay,
//! carries exactly one frame:
//!
//! ```text
//! 0        4                12       14     15
//! +--------+----------------+--------+------+------------
//! | length | connection_id  | stream | type | payload ...
//! +--------+----------------+--------+------+------------
//! ```
//!
//! `length` counts every byte after itself. Integers are big-endian.
//!
//! # Invariants
//!
//! - A decoded frame consumed the whole datagram: no short reads, no trailing
//!   bytes.
//! - `encode` never produces a frame that would not fit in one datagram
//!   together with the relay prefix.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use zerocopy::{
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
    byteorder::{BigEndian, U16, U32, U64},
};

use crate::{
    FINGERPRINT_LEN, MAX_DATAGRAM_SIZE,
    errors::{ProtocolError, Result},
};

/// Opaque token identifying one multiplexed session on a shared socket.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Big-endian byte form, used as AEAD associated data.
    pub const fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConnectionId({self})")
    }
}

/// Frame type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    /// Initiator's IK handshake message.
    Handshake = 0x01,
    /// Encrypted application data.
    Data = 0x02,
    /// Handshake confirmation from the responder.
    Ack = 0x03,
    /// Graceful disconnect notice, empty payload.
    Goodbye = 0x04,
}

impl FrameType {
    /// Map a wire byte to a frame type.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Handshake),
            0x02 => Some(Self::Data),
            0x03 => Some(Self::Ack),
            0x04 => Some(Self::Goodbye),
            _ => None,
        }
    }

    /// Wire byte.
    pub const fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Fixed 15-byte frame header, laid out exactly as on the wire.
#[derive(Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct FrameHeader {
    total_length: U32<BigEndian>,
    connection_id: U64<BigEndian>,
    stream_id: U16<BigEndian>,
    frame_type: u8,
}

impl FrameHeader {
    /// Header size in bytes.
    pub const SIZE: usize = 15;

    /// Size of the length prefix; `total_length` counts everything after it.
    pub const LENGTH_PREFIX: usize = 4;

    /// Build a header for a payload of `payload_len` bytes.
    pub fn new(
        frame_type: FrameType,
        connection_id: ConnectionId,
        stream_id: u16,
        payload_len: usize,
    ) -> Self {
        let total = (Self::SIZE - Self::LENGTH_PREFIX).saturating_add(payload_len);
        Self {
            total_length: U32::new(u32::try_from(total).unwrap_or(u32::MAX)),
            connection_id: U64::new(connection_id.0),
            stream_id: U16::new(stream_id),
            frame_type: frame_type.to_u8(),
        }
    }

    /// Bytes following the length prefix, as declared on the wire.
    pub fn total_length(&self) -> u32 {
        self.total_length.get()
    }

    /// Payload size implied by the declared length.
    pub fn payload_size(&self) -> usize {
        (self.total_length() as usize).saturating_sub(Self::SIZE - Self::LENGTH_PREFIX)
    }

    /// Session this frame belongs to.
    pub fn connection_id(&self) -> ConnectionId {
        ConnectionId(self.connection_id.get())
    }

    /// Logical stream within the session.
    pub fn stream_id(&self) -> u16 {
        self.stream_id.get()
    }

    /// Raw frame type byte.
    pub fn frame_type_raw(&self) -> u8 {
        self.frame_type
    }

    /// Frame type, if known.
    pub fn frame_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }
}

impl fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameHeader")
            .field("total_length", &self.total_length())
            .field("connection_id", &self.connection_id())
            .field("stream_id", &self.stream_id())
            .field("frame_type", &self.frame_type())
            .finish()
    }
}

/// A decoded frame: header plus payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Fixed header.
    pub header: FrameHeader,
    /// Frame payload; meaning depends on the frame type.
    pub payload: Bytes,
}

impl Frame {
    /// Largest payload that still fits in one datagram behind a relay prefix.
    pub const MAX_PAYLOAD_SIZE: usize =
        MAX_DATAGRAM_SIZE - FrameHeader::SIZE - (1 + FINGERPRINT_LEN);

    /// Build a frame.
    pub fn new(
        frame_type: FrameType,
        connection_id: ConnectionId,
        stream_id: u16,
        payload: impl Into<Bytes>,
    ) -> Self {
        let payload = payload.into();
        let header = FrameHeader::new(frame_type, connection_id, stream_id, payload.len());
        Self { header, payload }
    }

    /// GOODBYE frame for a session.
    pub fn goodbye(connection_id: ConnectionId) -> Self {
        Self::new(FrameType::Goodbye, connection_id, 0, Bytes::new())
    }

    /// Frame type. Always known for frames built or decoded by this crate.
    pub fn frame_type(&self) -> Option<FrameType> {
        self.header.frame_type()
    }

    /// Session this frame belongs to.
    pub fn connection_id(&self) -> ConnectionId {
        self.header.connection_id()
    }

    /// Encoded size in bytes.
    pub fn encoded_len(&self) -> usize {
        FrameHeader::SIZE + self.payload.len()
    }

    /// Encode into `dst`.
    ///
    /// # Errors
    ///
    /// `PayloadTooLarge` if the payload exceeds [`Frame::MAX_PAYLOAD_SIZE`].
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        if self.payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        let header = FrameHeader::new(
            self.header.frame_type().unwrap_or(FrameType::Data),
            self.header.connection_id(),
            self.header.stream_id(),
            self.payload.len(),
        );
        let header = FrameHeader { frame_type: self.header.frame_type_raw(), ..header };

        dst.put_slice(header.as_bytes());
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode exactly one frame occupying all of `bytes`.
    ///
    /// # Errors
    ///
    /// - `FrameTooShort` if fewer than [`FrameHeader::SIZE`] bytes
    /// - `LengthTooSmall` if the declared length cannot cover the header
    /// - `LengthExceedsBuffer` if the declared length runs past the buffer
    /// - `TrailingBytes` if bytes follow the declared end
    /// - `UnknownFrameType` for an unrecognised type byte
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (header, _) = FrameHeader::read_from_prefix(bytes).map_err(|_| {
            ProtocolError::FrameTooShort { expected: FrameHeader::SIZE, actual: bytes.len() }
        })?;

        let declared = header.total_length();
        let min_declared = FrameHeader::SIZE - FrameHeader::LENGTH_PREFIX;
        if (declared as usize) < min_declared {
            return Err(ProtocolError::LengthTooSmall(declared));
        }

        let available = bytes.len() - FrameHeader::LENGTH_PREFIX;
        let declared = declared as usize;
        if declared > available {
            return Err(ProtocolError::LengthExceedsBuffer { declared, available });
        }
        if declared < available {
            return Err(ProtocolError::TrailingBytes(available - declared));
        }

        if header.frame_type().is_none() {
            return Err(ProtocolError::UnknownFrameType(header.frame_type_raw()));
        }

        let payload = Bytes::copy_from_slice(&bytes[FrameHeader::SIZE..]);
        Ok(Self { header, payload })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn header_is_fifteen_bytes() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
    }

    #[test]
    fn encodes_known_layout() {
        let frame = Frame::new(
            FrameType::Data,
            ConnectionId(0x0102_0304_0506_0708),
            0x0a0b,
            Bytes::from_static(b"hi"),
        );
        let bytes = frame.to_bytes().unwrap();
        assert_eq!(bytes.as_ref(), hex!("0000000d 0102030405060708 0a0b 02 6869"));
    }

    #[test]
    fn goodbye_has_empty_payload() {
        let frame = Frame::goodbye(ConnectionId(7));
        let decoded = Frame::decode(&frame.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.frame_type(), Some(FrameType::Goodbye));
        assert!(decoded.payload.is_empty());
        assert_eq!(decoded.connection_id(), ConnectionId(7));
    }

    #[test]
    fn rejects_short_buffer() {
        let err = Frame::decode(&[0u8; 14]).unwrap_err();
        assert_eq!(err, ProtocolError::FrameTooShort { expected: 15, actual: 14 });
    }

    #[test]
    fn rejects_length_past_buffer() {
        let mut bytes = Frame::new(FrameType::Data, ConnectionId(1), 0, vec![1, 2, 3])
            .to_bytes()
            .unwrap()
            .to_vec();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            Frame::decode(&bytes),
            Err(ProtocolError::LengthExceedsBuffer { declared: 14, available: 13 })
        ));
    }

    #[test]
    fn rejects_length_below_header() {
        let bytes = hex!("00000005 0000000000000001 0000 02");
        assert_eq!(Frame::decode(&bytes), Err(ProtocolError::LengthTooSmall(5)));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes =
            Frame::new(FrameType::Ack, ConnectionId(1), 0, vec![]).to_bytes().unwrap().to_vec();
        bytes.push(0xff);
        assert_eq!(Frame::decode(&bytes), Err(ProtocolError::TrailingBytes(1)));
    }

    #[test]
    fn rejects_unknown_type() {
        let bytes = hex!("0000000b 0000000000000001 0000 09");
        assert_eq!(Frame::decode(&bytes), Err(ProtocolError::UnknownFrameType(0x09)));
    }

    #[test]
    fn rejects_oversized_payload() {
        let frame =
            Frame::new(FrameType::Data, ConnectionId(1), 0, vec![0u8; Frame::MAX_PAYLOAD_SIZE + 1]);
        assert!(matches!(frame.to_bytes(), Err(ProtocolError::PayloadTooLarge { .. })));
    }
}
