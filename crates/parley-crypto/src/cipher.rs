//! Per-message AEAD for established sessions.
//!
//! ChaCha20-Poly1305 with a 96-bit nonce built from the message sequence
//! number: `sequence (8, little-endian) ‖ 0x00000000`. Each direction has its
//! own key, so the two directions never share a nonce space.
//!
//! Sequence bookkeeping (which numbers were used, which are acceptable) lives
//! with the session in `parley-core`; this module only seals and opens.

use std::fmt;

use chacha20poly1305::{
    ChaCha20Poly1305, Key, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use parley_proto::ACK_TAG_SIZE;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// Sequence number reserved for the handshake ACK tag. DATA never uses it.
pub const ACK_SEQUENCE: u64 = u64::MAX;

/// Nonce for a given sequence number.
pub fn nonce_for(sequence: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce[..8].copy_from_slice(&sequence.to_le_bytes());
    nonce
}

fn seal(key: &[u8; 32], nonce: [u8; 12], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(&nonce), Payload { msg, aad })
        .map_err(|_| CryptoError::EncryptionFailed)
}

fn open(key: &[u8; 32], nonce: [u8; 12], msg: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(&nonce), Payload { msg, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}

/// Directional keys produced by a completed handshake.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKeys {
    send: [u8; 32],
    recv: [u8; 32],
}

impl SessionKeys {
    pub(crate) const fn new(send: [u8; 32], recv: [u8; 32]) -> Self {
        Self { send, recv }
    }

    /// Key for outbound messages.
    pub const fn send_key(&self) -> &[u8; 32] {
        &self.send
    }

    /// Key for inbound messages.
    pub const fn recv_key(&self) -> &[u8; 32] {
        &self.recv
    }

    /// Encrypt an outbound message.
    ///
    /// The caller guarantees `sequence` was never used with this key before
    /// and is not [`ACK_SEQUENCE`].
    pub fn seal(&self, sequence: u64, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        seal(&self.send, nonce_for(sequence), plaintext, aad)
    }

    /// Decrypt an inbound message.
    pub fn open(&self, sequence: u64, aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        open(&self.recv, nonce_for(sequence), ciphertext, aad)
    }

    /// Handshake confirmation tag, sent by the responder.
    pub fn ack_tag(&self, aad: &[u8]) -> Result<[u8; ACK_TAG_SIZE], CryptoError> {
        let sealed = seal(&self.send, nonce_for(ACK_SEQUENCE), &[], aad)?;
        sealed.as_slice().try_into().map_err(|_| CryptoError::EncryptionFailed)
    }

    /// Check a confirmation tag from the responder.
    pub fn verify_ack(&self, aad: &[u8], tag: &[u8; ACK_TAG_SIZE]) -> Result<(), CryptoError> {
        open(&self.recv, nonce_for(ACK_SEQUENCE), tag, aad).map(|_| ())
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("send", &"<redacted>")
            .field("recv", &"<redacted>")
            .finish()
    }
}
