//! Fixed-width peer identifier.
//!
//! A fingerprint is the first 16 lowercase hex characters of the SHA-256 of a
//! static public key (computed in `parley-crypto`). On the wire it travels as
//! those 16 ASCII bytes, so the relay can treat it as an opaque 16-byte id.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{ProtocolError, Result};

/// Width of a fingerprint on the wire, in bytes.
pub const FINGERPRINT_LEN: usize = 16;

/// Stable identifier of a peer's static key.
///
/// Ordering is lexicographic over the raw bytes, which for well-formed
/// fingerprints equals lexicographic order of the hex strings. The handshake
/// tie-break relies on this.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw wire bytes without validation.
    ///
    /// Relays use this: they never interpret fingerprints, only compare them.
    pub const fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Read a fingerprint from the start of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; FINGERPRINT_LEN] = bytes
            .get(..FINGERPRINT_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(ProtocolError::InvalidFingerprint)?;
        Ok(Self(raw))
    }

    /// Parse the canonical text form: exactly 16 lowercase hex characters.
    pub fn parse(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();
        if bytes.len() != FINGERPRINT_LEN
            || !bytes.iter().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
        {
            return Err(ProtocolError::InvalidFingerprint);
        }
        Self::from_slice(bytes)
    }

    /// Raw wire bytes.
    pub const fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// True if the bytes are the canonical lowercase-hex form.
    pub fn is_canonical(&self) -> bool {
        std::str::from_utf8(&self.0).is_ok_and(|s| Self::parse(s).is_ok())
    }

    /// First eight characters, for log lines and placeholder names.
    pub fn short(&self) -> String {
        self.to_string().chars().take(8).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(FINGERPRINT_LEN);
        f.write_str(&String::from_utf8_lossy(&self.0[..end]))
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({self})")
    }
}

impl FromStr for Fingerprint {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}
