//! Cryptographic error types.

use thiserror::Error;

/// Errors from per-message encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Authentication failed: wrong key, wrong nonce, or tampered data.
    #[error("decryption failed")]
    DecryptionFailed,

    /// AEAD refused to encrypt.
    #[error("encryption failed")]
    EncryptionFailed,

    /// Byte string is not a valid public key.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(&'static str),

    /// HKDF refused the requested output length.
    #[error("key derivation failed")]
    KeyDerivation,
}

/// Errors from processing a handshake message.
///
/// None of these are answered on the wire; the caller drops the datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HandshakeError {
    /// A Diffie-Hellman output was all zeros (low-order point).
    #[error("non-contributory key exchange")]
    NonContributory,

    /// The encrypted static key did not authenticate.
    #[error("handshake decryption failed")]
    DecryptionFailed,

    /// AEAD refused to encrypt the static key.
    #[error("handshake encryption failed")]
    EncryptionFailed,

    /// HKDF refused the requested output length.
    #[error("handshake key derivation failed")]
    KeyDerivation,
}
