//! One-round IK handshake.
//!
//! The initiator already knows the responder's static key (from discovery or
//! a relay peer list) and sends a single 80-byte message:
//!
//! ```text
//! pre:  h = HASH(name); ck = h; MixHash(rs)
//! ->    e, es, s, ss
//! ```
//!
//! - `MixHash(x)`: `h = SHA-256(h ‖ x)`
//! - `MixKey(ikm)`: HKDF-SHA256 with salt `ck`, 64 bytes out; `ck` takes the
//!   first half, the temporary key the second.
//! - `s` is sealed with the temporary key, nonce 0, associated data `h`.
//!
//! After `ss` the final chaining key is split into directional keys. The
//! initiator sends with `ck` and receives with `SHA-256(ck ‖ "recv")`; the
//! responder uses the same pair swapped.
//!
//! # Invariants
//!
//! - Both sides derive identical keys iff they used the same two static keys
//!   and the same ephemeral.
//! - A failed handshake creates no state on either side.

use chacha20poly1305::{
    ChaCha20Poly1305, Key, KeyInit, Nonce,
    aead::{Aead, Payload},
};
use hkdf::Hkdf;
use parley_proto::HandshakeInit;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    cipher::SessionKeys,
    error::HandshakeError,
    keys::{PublicKey, StaticKeypair},
};

/// Protocol name mixed into the transcript. Changing it changes every key.
pub const PROTOCOL_NAME: &[u8] = b"Parley_IK_25519_ChaChaPoly_SHA256_v1";

const RECV_LABEL: &[u8] = b"recv";

/// Which side of the handshake a session was created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sent the HANDSHAKE frame.
    Initiator,
    /// Received the HANDSHAKE frame.
    Responder,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct SymmetricState {
    ck: [u8; 32],
    h: [u8; 32],
}

impl SymmetricState {
    fn new(responder_static: &PublicKey) -> Self {
        let h: [u8; 32] = Sha256::digest(PROTOCOL_NAME).into();
        let mut state = Self { ck: h, h };
        state.mix_hash(responder_static.as_bytes());
        state
    }

    fn mix_hash(&mut self, data: &[u8]) {
        let mut hasher = Sha256::new();
        hasher.update(self.h);
        hasher.update(data);
        self.h = hasher.finalize().into();
    }

    fn mix_key(&mut self, ikm: &[u8]) -> Result<[u8; 32], HandshakeError> {
        let hk = Hkdf::<Sha256>::new(Some(&self.ck), ikm);
        let mut okm = [0u8; 64];
        hk.expand(&[], &mut okm).map_err(|_| HandshakeError::KeyDerivation)?;
        self.ck.copy_from_slice(&okm[..32]);
        let mut temp = [0u8; 32];
        temp.copy_from_slice(&okm[32..]);
        okm.zeroize();
        Ok(temp)
    }

    fn encrypt_and_hash(&mut self, mut key: [u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&[0u8; 12]), Payload { msg: plaintext, aad: &self.h })
            .map_err(|_| HandshakeError::EncryptionFailed)?;
        self.mix_hash(&ciphertext);
        Ok(ciphertext)
    }

    fn decrypt_and_hash(&mut self, mut key: [u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, HandshakeError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        key.zeroize();
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&[0u8; 12]), Payload { msg: ciphertext, aad: &self.h })
            .map_err(|_| HandshakeError::DecryptionFailed)?;
        self.mix_hash(ciphertext);
        Ok(plaintext)
    }

    fn split(&self, role: Role) -> SessionKeys {
        let mut hasher = Sha256::new();
        hasher.update(self.ck);
        hasher.update(RECV_LABEL);
        let derived: [u8; 32] = hasher.finalize().into();
        match role {
            Role::Initiator => SessionKeys::new(self.ck, derived),
            Role::Responder => SessionKeys::new(derived, self.ck),
        }
    }
}

/// Build the initiator's handshake message.
///
/// `ephemeral_seed` must be fresh random bytes for every attempt.
pub fn initiate(
    local: &StaticKeypair,
    remote_static: &PublicKey,
    ephemeral_seed: [u8; 32],
) -> Result<(HandshakeInit, SessionKeys), HandshakeError> {
    let ephemeral = StaticKeypair::from_secret_bytes(ephemeral_seed);
    let mut state = SymmetricState::new(remote_static);

    state.mix_hash(ephemeral.public().as_bytes());

    let es = ephemeral.diffie_hellman(remote_static)?;
    let key = state.mix_key(es.as_bytes())?;

    let sealed = state.encrypt_and_hash(key, local.public().as_bytes())?;
    let encrypted_static: [u8; 48] =
        sealed.as_slice().try_into().map_err(|_| HandshakeError::EncryptionFailed)?;

    let ss = local.diffie_hellman(remote_static)?;
    state.mix_key(ss.as_bytes())?;

    let message = HandshakeInit { ephemeral_public: *ephemeral.public().as_bytes(), encrypted_static };
    Ok((message, state.split(Role::Initiator)))
}

/// Process an inbound handshake message.
///
/// Returns the initiator's static key (for the trust check) and the session
/// keys. On error nothing has been committed.
pub fn respond(
    local: &StaticKeypair,
    message: &HandshakeInit,
) -> Result<(PublicKey, SessionKeys), HandshakeError> {
    let remote_ephemeral = PublicKey::from_bytes(message.ephemeral_public);
    let mut state = SymmetricState::new(local.public());

    state.mix_hash(remote_ephemeral.as_bytes());

    let es = local.diffie_hellman(&remote_ephemeral)?;
    let key = state.mix_key(es.as_bytes())?;

    let plaintext = state.decrypt_and_hash(key, &message.encrypted_static)?;
    let remote_static =
        PublicKey::from_slice(&plaintext).map_err(|_| HandshakeError::DecryptionFailed)?;

    let ss = local.diffie_hellman(&remote_static)?;
    state.mix_key(ss.as_bytes())?;

    Ok((remote_static, state.split(Role::Responder)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_agree() {
        let alice = StaticKeypair::from_secret_bytes([0x11; 32]);
        let bob = StaticKeypair::from_secret_bytes([0x22; 32]);

        let (message, init_keys) = initiate(&alice, bob.public(), [0x33; 32]).unwrap();
        let (remote, resp_keys) = respond(&bob, &message).unwrap();

        assert_eq!(remote, *alice.public());
        assert_eq!(init_keys.send_key(), resp_keys.recv_key());
        assert_eq!(init_keys.recv_key(), resp_keys.send_key());
        assert_ne!(init_keys.send_key(), init_keys.recv_key());
    }

    #[test]
    fn wrong_responder_cannot_decrypt() {
        let alice = StaticKeypair::from_secret_bytes([0x11; 32]);
        let bob = StaticKeypair::from_secret_bytes([0x22; 32]);
        let carol = StaticKeypair::from_secret_bytes([0x44; 32]);

        let (message, _) = initiate(&alice, bob.public(), [0x33; 32]).unwrap();
        assert_eq!(respond(&carol, &message).err(), Some(HandshakeError::DecryptionFailed));
    }

    #[test]
    fn tampered_message_is_rejected() {
        let alice = StaticKeypair::from_secret_bytes([0x11; 32]);
        let bob = StaticKeypair::from_secret_bytes([0x22; 32]);

        let (mut message, _) = initiate(&alice, bob.public(), [0x33; 32]).unwrap();
        message.encrypted_static[0] ^= 1;
        assert_eq!(respond(&bob, &message).err(), Some(HandshakeError::DecryptionFailed));

        let (mut message, _) = initiate(&alice, bob.public(), [0x33; 32]).unwrap();
        message.ephemeral_public[5] ^= 0x80;
        assert!(respond(&bob, &message).is_err());
    }

    #[test]
    fn zero_ephemeral_is_rejected() {
        let bob = StaticKeypair::from_secret_bytes([0x22; 32]);
        let message = HandshakeInit { ephemeral_public: [0; 32], encrypted_static: [0; 48] };
        assert_eq!(respond(&bob, &message).err(), Some(HandshakeError::NonContributory));
    }

    #[test]
    fn fresh_ephemeral_gives_fresh_keys() {
        let alice = StaticKeypair::from_secret_bytes([0x11; 32]);
        let bob = StaticKeypair::from_secret_bytes([0x22; 32]);

        let (_, first) = initiate(&alice, bob.public(), [0x33; 32]).unwrap();
        let (_, second) = initiate(&alice, bob.public(), [0x34; 32]).unwrap();
        assert_ne!(first.send_key(), second.send_key());
    }
}
