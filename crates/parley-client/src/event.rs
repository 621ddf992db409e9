//! Messenger events and actions.
//!
//! Events flow in from the driver (socket, user commands, timer); actions
//! flow back out for the driver to execute. The messenger itself never
//! touches a socket.

use std::net::SocketAddr;

use bytes::Bytes;
use parley_core::{PeerState, QueueEntry, Route};
use parley_crypto::PublicKey;
use parley_proto::Fingerprint;

/// Input to [`Messenger::handle`](crate::Messenger::handle).
#[derive(Debug, Clone)]
pub enum MessengerEvent {
    /// A peer announced itself on the local network.
    PeerDiscovered {
        /// Announced display name.
        name: String,
        /// Address the announcement came from.
        addr: SocketAddr,
        /// Announced static key.
        public_key: PublicKey,
    },

    /// Discovery reports a peer gone (service withdrawn, host unreachable).
    PeerLost {
        /// Peer that went away.
        fingerprint: Fingerprint,
    },

    /// A datagram arrived on the socket.
    DatagramReceived {
        /// Sender address (the relay, for forwarded frames).
        from: SocketAddr,
        /// Raw datagram.
        datagram: Bytes,
    },

    /// The user wants to send a message.
    SendMessage {
        /// Peer name or fingerprint.
        to: String,
        /// Message text.
        text: String,
    },

    /// The user wants a session with a peer now.
    Connect {
        /// Peer name or fingerprint.
        to: String,
    },

    /// Some `Transmit` actions carrying queue entries could not be sent.
    TransmitFailed {
        /// Entries to put back, in original order.
        entries: Vec<QueueEntry>,
    },

    /// Periodic timer: handshake timeouts, queued flushes, relay heartbeat.
    Tick,

    /// Close every session.
    Shutdown,
}

/// Output of [`Messenger::handle`](crate::Messenger::handle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessengerAction {
    /// Send a datagram.
    Transmit {
        /// Destination socket address.
        to: SocketAddr,
        /// Encoded datagram.
        datagram: Bytes,
        /// Message to put back in the queue if the send fails.
        requeue: Option<QueueEntry>,
    },

    /// A message arrived.
    Deliver {
        /// Sender.
        from: Fingerprint,
        /// Sender's display name.
        name: String,
        /// Stream the message arrived on.
        stream_id: u16,
        /// Message text.
        text: String,
    },

    /// A session is ready for traffic.
    SessionEstablished {
        /// Peer.
        fingerprint: Fingerprint,
        /// Peer's display name.
        name: String,
    },

    /// A session ended.
    SessionClosed {
        /// Peer.
        fingerprint: Fingerprint,
        /// Why.
        reason: String,
    },

    /// A message was queued for later delivery.
    Queued {
        /// Recipient.
        to: Fingerprint,
        /// Messages now waiting for this recipient.
        pending: usize,
    },

    /// A peer presented a key that does not match the pinned one.
    TrustWarning {
        /// Peer.
        fingerprint: Fingerprint,
        /// Human-readable warning.
        message: String,
    },

    /// The peer directory changed.
    PeersUpdated {
        /// Number of known peers.
        count: usize,
    },
}

/// Snapshot of one peer for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    /// Display name.
    pub name: String,
    /// Fingerprint.
    pub fingerprint: Fingerprint,
    /// Current route.
    pub route: Route,
    /// Discovery state.
    pub state: PeerState,
    /// True if a session is established.
    pub connected: bool,
    /// Messages queued for this peer.
    pub pending: usize,
}
