//! Static identity keys and fingerprints.

use std::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hkdf::Hkdf;
use parley_proto::{FINGERPRINT_LEN, Fingerprint};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use x25519_dalek::{SharedSecret, StaticSecret};
use zeroize::Zeroizing;

use crate::error::{CryptoError, HandshakeError};

/// Length of an X25519 public key.
pub const PUBLIC_KEY_LEN: usize = 32;

const SIGNING_KEY_INFO: &[u8] = b"parley signing key v1";

/// X25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_LEN]);

impl PublicKey {
    /// Wrap raw bytes.
    pub const fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse from a slice that must be exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let raw: [u8; PUBLIC_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidPublicKey("expected 32 bytes"))?;
        Ok(Self(raw))
    }

    /// Parse from 64 hex characters.
    pub fn from_hex(text: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(text).map_err(|_| CryptoError::InvalidPublicKey("invalid hex"))?;
        Self::from_slice(&bytes)
    }

    /// Raw bytes.
    pub const fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex form, as persisted in the contact book.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Fingerprint of this key.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }

    fn to_dalek(self) -> x25519_dalek::PublicKey {
        x25519_dalek::PublicKey::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::from_hex(&text).map_err(serde::de::Error::custom)
    }
}

/// First 16 hex characters of SHA-256 over the public key bytes.
pub fn fingerprint(public_key: &PublicKey) -> Fingerprint {
    let digest = Sha256::digest(public_key.as_bytes());
    let text = hex::encode(&digest[..FINGERPRINT_LEN / 2]);
    let mut raw = [0u8; FINGERPRINT_LEN];
    raw.copy_from_slice(text.as_bytes());
    Fingerprint::from_bytes(raw)
}

/// Long-term X25519 identity keypair.
///
/// The secret half zeroizes on drop. An Ed25519 signing key is derived from
/// it on demand, so one persisted secret covers both key agreement and
/// signatures.
#[derive(Clone)]
pub struct StaticKeypair {
    secret: StaticSecret,
    public: PublicKey,
}

impl StaticKeypair {
    /// Build a keypair from 32 secret bytes (random for a new identity, or
    /// loaded from disk).
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey(*x25519_dalek::PublicKey::from(&secret).as_bytes());
        Self { secret, public }
    }

    /// Secret bytes for persistence.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.secret.to_bytes())
    }

    /// Public half.
    pub const fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Fingerprint of the public half.
    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(&self.public)
    }

    /// X25519 with a remote public key, rejecting low-order points.
    pub(crate) fn diffie_hellman(&self, remote: &PublicKey) -> Result<SharedSecret, HandshakeError> {
        let shared = self.secret.diffie_hellman(&remote.to_dalek());
        if shared.was_contributory() { Ok(shared) } else { Err(HandshakeError::NonContributory) }
    }

    fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        let secret = self.secret_bytes();
        let hk = Hkdf::<Sha256>::new(None, &secret[..]);
        let mut seed = Zeroizing::new([0u8; 32]);
        hk.expand(SIGNING_KEY_INFO, &mut seed[..]).map_err(|_| CryptoError::KeyDerivation)?;
        Ok(SigningKey::from_bytes(&seed))
    }

    /// Ed25519 verifying key matching [`StaticKeypair::sign`].
    pub fn verifying_key(&self) -> Result<VerifyingKey, CryptoError> {
        Ok(self.signing_key()?.verifying_key())
    }

    /// Sign `message` with the derived Ed25519 key.
    pub fn sign(&self, message: &[u8]) -> Result<Signature, CryptoError> {
        Ok(self.signing_key()?.sign(message))
    }

    /// Verify a signature made by [`StaticKeypair::sign`].
    pub fn verify(verifying_key: &VerifyingKey, message: &[u8], signature: &Signature) -> bool {
        verifying_key.verify(message, signature).is_ok()
    }
}

impl fmt::Debug for StaticKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticKeypair")
            .field("public", &self.public)
            .field("secret", &"<redacted>")
            .finish()
    }
}
