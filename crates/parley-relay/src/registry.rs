//! Relay registry
//!
//! The relay's only state: which fingerprint was last heard from which
//! address. Like the rest of the protocol core it performs no I/O; every
//! request yields actions for the driver to execute.
//!
//! ## Responsibilities
//!
//! - Registration: upsert fingerprint → address, refresh `last_seen`
//! - Forwarding: resolve a destination fingerprint to an address
//! - Discovery: list registrations for a requester
//! - Expiry: evict registrations idle past the inactivity timeout
//! - Accounting: count forwarded packets and bytes

use std::{
    collections::HashMap,
    net::SocketAddr,
    time::{Duration, Instant},
};

use bytes::Bytes;
use parley_proto::{
    Fingerprint, PeerEntry, RelayRequest, RelayResponse,
    relay::{REGISTER_KEY_LEN, peer_list_fit},
};

/// One registered client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Address the last REGISTER came from.
    pub address: SocketAddr,
    /// When the last REGISTER arrived.
    pub last_seen: Instant,
    /// Announced display name.
    pub display_name: String,
    /// Announced static key, opaque to the relay.
    pub public_key: Vec<u8>,
}

/// Actions returned by [`RelayRegistry`] for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayAction {
    /// Send a response to a client.
    Reply {
        /// Client address.
        to: SocketAddr,
        /// Response to encode.
        response: RelayResponse,
    },
    /// Send bytes verbatim to a client.
    Forward {
        /// Destination's registered address.
        to: SocketAddr,
        /// Payload from the RELAY command.
        payload: Bytes,
    },
}

/// Snapshot of relay activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Currently registered clients.
    pub registrations: usize,
    /// RELAY payloads forwarded since start.
    pub packets_relayed: u64,
    /// Payload bytes forwarded since start.
    pub bytes_relayed: u64,
}

/// Fingerprint-keyed registration table.
#[derive(Debug)]
pub struct RelayRegistry {
    registrations: HashMap<Fingerprint, Registration>,
    max_registrations: usize,
    packets_relayed: u64,
    bytes_relayed: u64,
}

impl RelayRegistry {
    /// Empty registry holding at most `max_registrations` clients.
    pub fn new(max_registrations: usize) -> Self {
        Self { registrations: HashMap::new(), max_registrations, packets_relayed: 0, bytes_relayed: 0 }
    }

    /// Process one request from `from`.
    pub fn handle(&mut self, request: RelayRequest, from: SocketAddr, now: Instant) -> Vec<RelayAction> {
        match request {
            RelayRequest::Register { fingerprint, name, public_key } => {
                self.register(fingerprint, name, public_key, from, now)
            },
            RelayRequest::Relay { destination, payload } => self.forward(destination, payload),
            RelayRequest::PeerListRequest { requester } => {
                vec![RelayAction::Reply { to: from, response: self.peer_list(&requester) }]
            },
        }
    }

    fn register(
        &mut self,
        fingerprint: Fingerprint,
        display_name: String,
        public_key: Vec<u8>,
        from: SocketAddr,
        now: Instant,
    ) -> Vec<RelayAction> {
        if public_key.len() != REGISTER_KEY_LEN {
            tracing::debug!(
                fingerprint = %fingerprint,
                key_len = public_key.len(),
                "bad static key length, dropping registration"
            );
            return Vec::new();
        }

        if let Some(existing) = self.registrations.get_mut(&fingerprint) {
            if existing.address != from {
                tracing::info!(fingerprint = %fingerprint, old = %existing.address, new = %from, "client moved");
            }
            *existing = Registration { address: from, last_seen: now, display_name, public_key };
        } else {
            if self.registrations.len() >= self.max_registrations {
                tracing::warn!(
                    fingerprint = %fingerprint,
                    limit = self.max_registrations,
                    "registry full, dropping registration"
                );
                return Vec::new();
            }
            tracing::info!(
                fingerprint = %fingerprint,
                name = %display_name,
                addr = %from,
                total = self.registrations.len() + 1,
                "client registered"
            );
            self.registrations
                .insert(fingerprint, Registration { address: from, last_seen: now, display_name, public_key });
        }

        vec![RelayAction::Reply { to: from, response: RelayResponse::RegisterAck { fingerprint } }]
    }

    fn forward(&mut self, destination: Fingerprint, payload: Bytes) -> Vec<RelayAction> {
        match self.registrations.get(&destination) {
            Some(reg) => {
                self.packets_relayed += 1;
                self.bytes_relayed += payload.len() as u64;
                vec![RelayAction::Forward { to: reg.address, payload }]
            },
            None => {
                tracing::debug!(destination = %destination, "unknown destination, dropping");
                Vec::new()
            },
        }
    }

    /// Registrations other than `requester`, sorted by fingerprint, cut to
    /// what one PEER_LIST datagram can carry.
    pub fn peer_list(&self, requester: &Fingerprint) -> RelayResponse {
        let mut entries: Vec<PeerEntry> = self
            .registrations
            .iter()
            .filter(|(fp, _)| *fp != requester)
            .map(|(fp, reg)| PeerEntry {
                fingerprint: *fp,
                name: reg.display_name.clone(),
                public_key: reg.public_key.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        entries.truncate(peer_list_fit(&entries));
        RelayResponse::PeerList(entries)
    }

    /// Evict registrations idle longer than `timeout`. Returns the evicted
    /// fingerprints.
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<Fingerprint> {
        let mut evicted = Vec::new();
        self.registrations.retain(|fp, reg| {
            let keep = now.saturating_duration_since(reg.last_seen) <= timeout;
            if !keep {
                tracing::info!(fingerprint = %fp, name = %reg.display_name, "removed stale client");
                evicted.push(*fp);
            }
            keep
        });
        evicted
    }

    /// Registration for `fingerprint`.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Registration> {
        self.registrations.get(fingerprint)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Current counters.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            registrations: self.registrations.len(),
            packets_relayed: self.packets_relayed,
            bytes_relayed: self.bytes_relayed,
        }
    }

    /// True if nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }
}
