//! Handshake payloads.

use bytes::Bytes;

use crate::errors::{ProtocolError, Result};

/// Size of an AEAD authentication tag.
pub const ACK_TAG_SIZE: usize = 16;

/// Initiator's single handshake message.
///
/// `ephemeral_public ‖ encrypted_static`, 80 bytes. The encrypted static key
/// is the initiator's 32-byte public key plus a 16-byte tag.
#[derive(Clone, PartialEq, Eq)]
pub struct HandshakeInit {
    /// Initiator's ephemeral X25519 public key.
    pub ephemeral_public: [u8; 32],
    /// Initiator's static public key, sealed under the `es` key.
    pub encrypted_static: [u8; 48],
}

impl HandshakeInit {
    /// Encoded size.
    pub const SIZE: usize = 80;

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(Self::SIZE);
        out.extend_from_slice(&self.ephemeral_public);
        out.extend_from_slice(&self.encrypted_static);
        Bytes::from(out)
    }

    /// Decode from a frame payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::SIZE {
            return Err(ProtocolError::InvalidHandshakeLength(bytes.len()));
        }
        let mut ephemeral_public = [0u8; 32];
        let mut encrypted_static = [0u8; 48];
        ephemeral_public.copy_from_slice(&bytes[..32]);
        encrypted_static.copy_from_slice(&bytes[32..]);
        Ok(Self { ephemeral_public, encrypted_static })
    }
}

impl std::fmt::Debug for HandshakeInit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeInit")
            .field("ephemeral_public", &"<32 bytes>")
            .field("encrypted_static", &"<48 bytes>")
            .finish()
    }
}

/// Responder's confirmation that the session is registered.
///
/// The tag proves possession of the derived keys, so the initiator can
/// tell a real responder from a spoofed ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeAck {
    /// AEAD tag over the empty plaintext.
    pub tag: [u8; ACK_TAG_SIZE],
}

impl HandshakeAck {
    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.tag)
    }

    /// Decode from a frame payload.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let tag: [u8; ACK_TAG_SIZE] =
            bytes.try_into().map_err(|_| ProtocolError::InvalidAckLength(bytes.len()))?;
        Ok(Self { tag })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_requires_exact_size() {
        assert_eq!(
            HandshakeInit::decode(&[0u8; 79]),
            Err(ProtocolError::InvalidHandshakeLength(79))
        );
        assert_eq!(
            HandshakeInit::decode(&[0u8; 81]),
            Err(ProtocolError::InvalidHandshakeLength(81))
        );
    }

    #[test]
    fn init_splits_fields() {
        let mut raw = [0u8; 80];
        raw[..32].fill(0xaa);
        raw[32..].fill(0xbb);
        let init = HandshakeInit::decode(&raw).unwrap();
        assert_eq!(init.ephemeral_public, [0xaa; 32]);
        assert_eq!(init.encrypted_static, [0xbb; 48]);
        assert_eq!(init.to_bytes().as_ref(), &raw[..]);
    }

    #[test]
    fn ack_requires_exact_size() {
        assert!(HandshakeAck::decode(&[0u8; 16]).is_ok());
        assert_eq!(HandshakeAck::decode(&[0u8; 15]), Err(ProtocolError::InvalidAckLength(15)));
    }
}
