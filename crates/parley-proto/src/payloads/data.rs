//! Encrypted application data payload.

use bytes::Bytes;

use crate::{
    ConnectionId,
    errors::{ProtocolError, Result},
    payloads::handshake::ACK_TAG_SIZE,
};

/// `sequence (8, big-endian) ‖ ciphertext`.
///
/// The sequence travels in the clear so the receiver can derive the nonce
/// without tracking an implicit counter; it is still authenticated as part of
/// the associated data.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedData {
    /// Sender's per-session sequence number.
    pub sequence: u64,
    /// AEAD ciphertext including the tag.
    pub ciphertext: Bytes,
}

impl SealedData {
    /// Smallest valid payload: sequence plus an empty message's tag.
    pub const MIN_SIZE: usize = 8 + ACK_TAG_SIZE;

    /// Associated data binding a DATA payload to its frame.
    pub fn associated_data(connection_id: ConnectionId, stream_id: u16, sequence: u64) -> [u8; 18] {
        let mut ad = [0u8; 18];
        ad[..8].copy_from_slice(&connection_id.to_be_bytes());
        ad[8..10].copy_from_slice(&stream_id.to_be_bytes());
        ad[10..].copy_from_slice(&sequence.to_be_bytes());
        ad
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(8 + self.ciphertext.len());
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.ciphertext);
        Bytes::from(out)
    }

    /// Decode from a frame payload.
    pub fn decode(bytes: &Bytes) -> Result<Self> {
        if bytes.len() < Self::MIN_SIZE {
            return Err(ProtocolError::DataTooShort(bytes.len()));
        }
        let mut seq = [0u8; 8];
        seq.copy_from_slice(&bytes[..8]);
        Ok(Self { sequence: u64::from_be_bytes(seq), ciphertext: bytes.slice(8..) })
    }
}

impl std::fmt::Debug for SealedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedData")
            .field("sequence", &self.sequence)
            .field("ciphertext", &format!("<{} bytes>", self.ciphertext.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_reads_sequence() {
        let mut raw = 42u64.to_be_bytes().to_vec();
        raw.extend_from_slice(&[7u8; 20]);
        let data = SealedData::decode(&Bytes::from(raw.clone())).unwrap();
        assert_eq!(data.sequence, 42);
        assert_eq!(data.ciphertext.len(), 20);
        assert_eq!(data.to_bytes().as_ref(), &raw[..]);
    }

    #[test]
    fn decode_rejects_short_payload() {
        let raw = Bytes::from_static(&[0u8; 23]);
        assert_eq!(SealedData::decode(&raw), Err(ProtocolError::DataTooShort(23)));
    }

    #[test]
    fn associated_data_layout() {
        let ad = SealedData::associated_data(ConnectionId(1), 2, 3);
        assert_eq!(&ad[..8], &1u64.to_be_bytes());
        assert_eq!(&ad[8..10], &2u16.to_be_bytes());
        assert_eq!(&ad[10..], &3u64.to_be_bytes());
    }
}
