//! Fuzz target for [`Frame::decode`]
//!
//! Every datagram off the wire goes through here before anything else looks
//! at it.
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - A decoded frame re-encodes to exactly the input bytes
//! - Decoded payloads never exceed `Frame::MAX_PAYLOAD_SIZE`
//! - DATA payloads that decode as `SealedData` carry at least the tag

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use parley_proto::{Frame, FrameType, SealedData};

fuzz_target!(|data: &[u8]| {
    let Ok(frame) = Frame::decode(data) else {
        return;
    };

    assert!(frame.payload.len() <= Frame::MAX_PAYLOAD_SIZE);
    let encoded = frame.to_bytes().unwrap();
    assert_eq!(&encoded[..], data);

    if frame.frame_type() == Some(FrameType::Data) {
        let payload = Bytes::copy_from_slice(&frame.payload);
        if let Ok(sealed) = SealedData::decode(&payload) {
            assert!(payload.len() >= SealedData::MIN_SIZE);
            let _ = sealed.sequence;
        }
    }
});
