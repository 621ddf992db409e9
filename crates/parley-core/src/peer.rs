//! Directory of reachable peers.
//!
//! A peer is identified by fingerprint. Discovery (LAN announcement or a
//! relay peer list) supplies name, route and key; an inbound handshake from a
//! stranger creates a `Pending` entry that discovery later upgrades.

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    time::Instant,
};

use parley_crypto::PublicKey;
use parley_proto::Fingerprint;

/// How datagrams reach a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Straight to the peer's socket.
    Direct(SocketAddr),
    /// Wrapped in RELAY commands addressed to the peer's fingerprint.
    Relayed(Fingerprint),
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(addr) => write!(f, "direct:{addr}"),
            Self::Relayed(fp) => write!(f, "relay:{fp}"),
        }
    }
}

/// How much we know about a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Learned from an inbound handshake; not yet announced.
    Pending,
    /// Announced by discovery or a relay peer list.
    Known,
}

/// A reachable peer.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Display name as announced.
    pub name: String,
    /// Current route.
    pub route: Route,
    /// Fingerprint of `public_key`.
    pub fingerprint: Fingerprint,
    /// Static key.
    pub public_key: PublicKey,
    /// Discovery state.
    pub state: PeerState,
    /// Last time discovery or traffic refreshed this entry.
    pub last_seen: Instant,
}

/// What [`PeerDirectory::discover`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// First time we hear of this fingerprint.
    New,
    /// Name, route or state changed.
    Updated,
    /// Nothing but `last_seen` changed.
    Refreshed,
}

/// Fingerprint-keyed peer table.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: HashMap<Fingerprint, Peer>,
}

impl PeerDirectory {
    /// Empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an announcement. Existing entries keep their fingerprint and
    /// key; name and route follow the announcement and `Pending` becomes
    /// `Known`.
    pub fn discover(
        &mut self,
        name: &str,
        route: Route,
        public_key: PublicKey,
        now: Instant,
    ) -> DiscoveryOutcome {
        let fingerprint = public_key.fingerprint();
        match self.peers.get_mut(&fingerprint) {
            Some(peer) => {
                peer.last_seen = now;
                let changed =
                    peer.name != name || peer.route != route || peer.state != PeerState::Known;
                if changed {
                    name.clone_into(&mut peer.name);
                    peer.route = route;
                    peer.state = PeerState::Known;
                    DiscoveryOutcome::Updated
                } else {
                    DiscoveryOutcome::Refreshed
                }
            },
            None => {
                self.peers.insert(
                    fingerprint,
                    Peer {
                        name: name.to_owned(),
                        route,
                        fingerprint,
                        public_key,
                        state: PeerState::Known,
                        last_seen: now,
                    },
                );
                DiscoveryOutcome::New
            },
        }
    }

    /// Record a peer that reached us before any announcement. No-op if the
    /// fingerprint is already known.
    pub fn learn_pending(&mut self, name: &str, route: Route, public_key: PublicKey, now: Instant) {
        let fingerprint = public_key.fingerprint();
        self.peers.entry(fingerprint).or_insert_with(|| Peer {
            name: name.to_owned(),
            route,
            fingerprint,
            public_key,
            state: PeerState::Pending,
            last_seen: now,
        });
    }

    /// Peer by fingerprint.
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&Peer> {
        self.peers.get(fingerprint)
    }

    /// Peer by display name (case-insensitive) or fingerprint text.
    pub fn lookup(&self, name_or_fingerprint: &str) -> Option<&Peer> {
        if let Ok(fp) = Fingerprint::parse(name_or_fingerprint)
            && let Some(peer) = self.peers.get(&fp)
        {
            return Some(peer);
        }
        self.peers.values().find(|p| p.name.eq_ignore_ascii_case(name_or_fingerprint))
    }

    /// Forget a peer that discovery reports gone.
    pub fn remove(&mut self, fingerprint: &Fingerprint) -> Option<Peer> {
        self.peers.remove(fingerprint)
    }

    /// Mark a peer as recently active.
    pub fn touch(&mut self, fingerprint: &Fingerprint, now: Instant) {
        if let Some(peer) = self.peers.get_mut(fingerprint) {
            peer.last_seen = now;
        }
    }

    /// All peers, sorted by name.
    pub fn list(&self) -> Vec<&Peer> {
        let mut all: Vec<_> = self.peers.values().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name).then(a.fingerprint.cmp(&b.fingerprint)));
        all
    }

    /// Number of peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True if no peers are known.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
