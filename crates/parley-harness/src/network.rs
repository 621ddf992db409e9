//! In-memory network of messengers.
//!
//! Every node is a [`Messenger`] with a fixed address. `Transmit` actions go
//! into a FIFO; [`Network::run`] drains it, handing each datagram to the
//! addressed node (or to the built-in relay) and queueing whatever that node
//! sends back. Nothing happens between calls, so a test controls exactly when
//! time passes and which datagrams are in flight.

use std::{
    collections::VecDeque,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use bytes::Bytes;
use parley_client::{ClientError, Messenger, MessengerAction, MessengerConfig, MessengerEvent};
use parley_core::{ContactBook, Environment, Identity, MessageQueue};
use parley_crypto::PublicKey;
use parley_proto::{Fingerprint, RelayRequest};
use parley_relay::{RelayAction, RelayRegistry};

use crate::SimEnv;

/// Upper bound on datagrams delivered by one [`Network::run`].
const MAX_DELIVERIES: usize = 100_000;

/// Client port used by every node.
const NODE_PORT: u16 = 4443;

/// Index of a node in a [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub usize);

struct Node {
    name: String,
    addr: SocketAddr,
    messenger: Messenger<SimEnv>,
    online: bool,
    events: Vec<MessengerAction>,
}

#[derive(Debug, Clone)]
struct Datagram {
    from: SocketAddr,
    to: SocketAddr,
    payload: Bytes,
}

struct Relay {
    addr: SocketAddr,
    registry: RelayRegistry,
}

/// Messengers and an optional relay joined by a lossless in-order network.
pub struct Network {
    env: SimEnv,
    nodes: Vec<Node>,
    relay: Option<Relay>,
    in_flight: VecDeque<Datagram>,
    delivered: Vec<Datagram>,
    dropped: usize,
    rejected: usize,
}

impl Network {
    /// Empty network. `seed` drives every key and connection id.
    pub fn new(seed: u64) -> Self {
        Self {
            env: SimEnv::with_seed(seed),
            nodes: Vec::new(),
            relay: None,
            in_flight: VecDeque::new(),
            delivered: Vec::new(),
            dropped: 0,
            rejected: 0,
        }
    }

    /// Network with a relay at `10.0.0.254:7777`. Nodes added afterwards are
    /// configured to use it.
    pub fn with_relay(seed: u64) -> Self {
        let mut network = Self::new(seed);
        network.relay = Some(Relay {
            addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 254)), 7777),
            registry: RelayRegistry::new(1024),
        });
        network
    }

    /// Shared clock and RNG.
    pub fn env(&self) -> &SimEnv {
        &self.env
    }

    /// Relay address, if the network has one.
    pub fn relay_addr(&self) -> Option<SocketAddr> {
        self.relay.as_ref().map(|r| r.addr)
    }

    /// Add a node with empty in-memory stores.
    pub fn add_node(&mut self, name: &str) -> NodeId {
        self.add_node_with(name, ContactBook::in_memory(), MessageQueue::in_memory())
    }

    /// Add a node around existing stores, e.g. ones opened from a directory.
    pub fn add_node_with(&mut self, name: &str, contacts: ContactBook, queue: MessageQueue) -> NodeId {
        let id = NodeId(self.nodes.len());
        let host = u8::try_from(id.0 + 1).unwrap_or(u8::MAX);
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, host)), NODE_PORT);

        let config = MessengerConfig {
            display_name: name.to_owned(),
            relay: self.relay_addr(),
            ..Default::default()
        };
        let identity = Identity::generate(&self.env);
        let messenger = Messenger::new(self.env.clone(), identity, contacts, queue, config);

        self.nodes.push(Node {
            name: name.to_owned(),
            addr,
            messenger,
            online: true,
            events: Vec::new(),
        });
        id
    }

    /// Node address.
    pub fn addr(&self, id: NodeId) -> SocketAddr {
        self.nodes[id.0].addr
    }

    /// Node fingerprint.
    pub fn fingerprint(&self, id: NodeId) -> Fingerprint {
        self.nodes[id.0].messenger.fingerprint()
    }

    /// Node static public key.
    pub fn public_key(&self, id: NodeId) -> PublicKey {
        *self.nodes[id.0].messenger.public_key()
    }

    /// Node state, for assertions.
    pub fn messenger(&self, id: NodeId) -> &Messenger<SimEnv> {
        &self.nodes[id.0].messenger
    }

    /// Take a node off the network. Datagrams to it are lost and it gets no
    /// ticks.
    pub fn set_online(&mut self, id: NodeId, online: bool) {
        self.nodes[id.0].online = online;
    }

    /// LAN discovery in both directions: `a` hears `b`, then `b` hears `a`.
    pub fn introduce(&mut self, a: NodeId, b: NodeId) -> Result<(), ClientError> {
        self.announce(b, a)?;
        self.announce(a, b)
    }

    /// `listener` hears `speaker`'s announcement from `addr`.
    pub fn announce_from(
        &mut self,
        speaker: NodeId,
        listener: NodeId,
        addr: SocketAddr,
    ) -> Result<(), ClientError> {
        let event = MessengerEvent::PeerDiscovered {
            name: self.nodes[speaker.0].name.clone(),
            addr,
            public_key: self.public_key(speaker),
        };
        self.handle(listener, event)
    }

    fn announce(&mut self, speaker: NodeId, listener: NodeId) -> Result<(), ClientError> {
        self.announce_from(speaker, listener, self.addr(speaker))
    }

    /// Feed an event to a node and queue its output.
    pub fn handle(&mut self, id: NodeId, event: MessengerEvent) -> Result<(), ClientError> {
        let actions = self.nodes[id.0].messenger.handle(event)?;
        self.absorb(id, actions);
        Ok(())
    }

    /// User on node `id` sends `text` to `to` (name or fingerprint).
    pub fn send(&mut self, id: NodeId, to: &str, text: &str) -> Result<(), ClientError> {
        self.handle(id, MessengerEvent::SendMessage { to: to.to_owned(), text: text.to_owned() })
    }

    /// Deliver datagrams until none are in flight. Returns how many were
    /// delivered.
    pub fn run(&mut self) -> usize {
        let mut count = 0;
        while let Some(datagram) = self.in_flight.pop_front() {
            if count == MAX_DELIVERIES {
                tracing::warn!("delivery limit reached, network still busy");
                self.in_flight.push_front(datagram);
                break;
            }
            count += 1;
            self.deliver(datagram);
        }
        count
    }

    /// Advance the clock, tick every online node, and run.
    pub fn advance(&mut self, by: Duration) {
        self.env.advance(by);
        for index in 0..self.nodes.len() {
            if self.nodes[index].online {
                let id = NodeId(index);
                if let Err(e) = self.handle(id, MessengerEvent::Tick) {
                    tracing::warn!(node = index, error = %e, "tick failed");
                }
            }
        }
        self.run();
    }

    /// Hand a raw datagram straight to a node, bypassing the network.
    pub fn inject(
        &mut self,
        id: NodeId,
        from: SocketAddr,
        datagram: Bytes,
    ) -> Result<Vec<MessengerAction>, ClientError> {
        self.nodes[id.0].messenger.handle(MessengerEvent::DatagramReceived { from, datagram })
    }

    /// Every datagram delivered to `id` so far, oldest first.
    pub fn received_by(&self, id: NodeId) -> Vec<(SocketAddr, Bytes)> {
        let addr = self.addr(id);
        self.delivered
            .iter()
            .filter(|d| d.to == addr)
            .map(|d| (d.from, d.payload.clone()))
            .collect()
    }

    /// Drain the notifications a node has produced.
    pub fn take_events(&mut self, id: NodeId) -> Vec<MessengerAction> {
        std::mem::take(&mut self.nodes[id.0].events)
    }

    /// Drain the messages a node has received, as `(sender, text)`.
    pub fn take_messages(&mut self, id: NodeId) -> Vec<(Fingerprint, String)> {
        self.take_events(id)
            .into_iter()
            .filter_map(|action| match action {
                MessengerAction::Deliver { from, text, .. } => Some((from, text)),
                _ => None,
            })
            .collect()
    }

    /// Datagrams lost to offline or unknown destinations.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Datagrams a node refused (malformed, replayed, unknown connection).
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    fn absorb(&mut self, id: NodeId, actions: Vec<MessengerAction>) {
        let from = self.nodes[id.0].addr;
        for action in actions {
            match action {
                MessengerAction::Transmit { to, datagram, .. } => {
                    self.in_flight.push_back(Datagram { from, to, payload: datagram });
                },
                other => self.nodes[id.0].events.push(other),
            }
        }
    }

    fn deliver(&mut self, datagram: Datagram) {
        if self.relay.as_ref().is_some_and(|r| r.addr == datagram.to) {
            self.deliver_to_relay(&datagram);
            return;
        }

        let Some(index) = self.nodes.iter().position(|n| n.addr == datagram.to && n.online) else {
            self.dropped += 1;
            return;
        };

        self.delivered.push(datagram.clone());
        let event = MessengerEvent::DatagramReceived { from: datagram.from, datagram: datagram.payload };
        match self.nodes[index].messenger.handle(event) {
            Ok(actions) => self.absorb(NodeId(index), actions),
            Err(e) if e.is_droppable() => {
                tracing::debug!(node = index, error = %e, "datagram rejected");
                self.rejected += 1;
            },
            Err(e) => tracing::warn!(node = index, error = %e, "datagram failed"),
        }
    }

    fn deliver_to_relay(&mut self, datagram: &Datagram) {
        let now = self.env.now();
        let Some(relay) = self.relay.as_mut() else {
            return;
        };
        let Ok(request) = RelayRequest::decode(&datagram.payload) else {
            self.rejected += 1;
            return;
        };

        let relay_addr = relay.addr;
        for action in relay.registry.handle(request, datagram.from, now) {
            match action {
                RelayAction::Reply { to, response } => match response.encode() {
                    Ok(payload) => self.in_flight.push_back(Datagram { from: relay_addr, to, payload }),
                    Err(e) => tracing::warn!(error = %e, "relay reply did not encode"),
                },
                RelayAction::Forward { to, payload } => {
                    self.in_flight.push_back(Datagram { from: relay_addr, to, payload });
                },
            }
        }
    }
}
