//! Fuzz target for the relay wire format
//!
//! The relay decodes requests from anyone; clients decode responses from
//! whatever claims to be the relay.
//!
//! # Invariants
//!
//! - NEVER panic on any input
//! - Anything that decodes can be re-encoded and decoded again (names with
//!   invalid UTF-8 are replaced lossily, so the second decode may differ)
//! - A PEER_LIST never decodes to more than `MAX_PEER_LIST_ENTRIES` entries

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use parley_proto::{RelayRequest, RelayResponse, relay::MAX_PEER_LIST_ENTRIES};

fuzz_target!(|data: &[u8]| {
    let datagram = Bytes::copy_from_slice(data);
    if let Ok(request) = RelayRequest::decode(&datagram) {
        let encoded = request.encode().unwrap();
        RelayRequest::decode(&encoded).unwrap();
    }

    if let Ok(response) = RelayResponse::decode(data) {
        assert!(RelayResponse::is_response(data));
        if let RelayResponse::PeerList(entries) = &response {
            assert!(entries.len() <= MAX_PEER_LIST_ENTRIES);
        }
        let encoded = response.encode().unwrap();
        RelayResponse::decode(&encoded).unwrap();
    }
});
