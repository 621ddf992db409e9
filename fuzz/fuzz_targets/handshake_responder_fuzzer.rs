//! Fuzz target for the responder side of the handshake
//!
//! An unauthenticated sender fully controls the HANDSHAKE payload.
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - Random bytes never authenticate: only a message sealed to our static
//!   key yields session keys

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_crypto::{StaticKeypair, respond};
use parley_proto::HandshakeInit;

fuzz_target!(|data: &[u8]| {
    let Ok(message) = HandshakeInit::decode(data) else {
        return;
    };

    let local = StaticKeypair::from_secret_bytes([0x42; 32]);
    assert!(respond(&local, &message).is_err());
});
