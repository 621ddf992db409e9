//! Parley cryptographic primitives.
//!
//! Static identity keys, the IK-pattern handshake, and per-message AEAD for
//! established sessions.
//!
//! # Design
//!
//! Every function here is pure. Randomness (key generation, ephemeral keys)
//! is supplied by the caller as seed bytes, so tests can pin every output
//! with a seeded RNG and the protocol core stays sans-IO.
//!
//! # Security Properties
//!
//! - Mutual authentication: both static keys feed the final chaining key.
//! - Initiator identity hiding: the initiator's static key is encrypted.
//! - Key hygiene: session keys and the handshake state zeroize on drop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cipher;
pub mod error;
pub mod handshake;
pub mod keys;

pub use cipher::{ACK_SEQUENCE, SessionKeys, nonce_for};
pub use error::{CryptoError, HandshakeError};
pub use handshake::{PROTOCOL_NAME, Role, initiate, respond};
pub use keys::{PUBLIC_KEY_LEN, PublicKey, StaticKeypair, fingerprint};
