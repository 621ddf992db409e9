//! Messenger state machine.
//!
//! The `Messenger` ties the protocol pieces together: discovery feeds the
//! [`PeerDirectory`], handshakes fill the [`SessionTable`], the
//! [`ContactBook`] pins keys, and the [`MessageQueue`] holds whatever could
//! not be sent yet. It performs no I/O. Every event returns the datagrams to
//! send and the notifications to surface, and the caller does the rest.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    net::SocketAddr,
    time::Instant,
};

use bytes::Bytes;
use parley_core::{
    ContactBook, DiscoveryOutcome, Environment, Identity, MessageQueue, PeerDirectory, PeerState,
    QueueEntry, Route, Session, SessionError, SessionTable,
};
use parley_crypto::{PublicKey, Role, initiate, respond};
use parley_proto::{
    ConnectionId, Fingerprint, Frame, FrameType, HandshakeInit, ProtocolError, RelayRequest,
    RelayResponse, SealedData,
};

use crate::{
    config::MessengerConfig,
    error::ClientError,
    event::{MessengerAction, MessengerEvent, PeerSummary},
};

/// Largest message text that fits in one DATA frame.
pub const MAX_MESSAGE_SIZE: usize = Frame::MAX_PAYLOAD_SIZE - SealedData::MIN_SIZE;

/// Stream used for chat text.
const CHAT_STREAM: u16 = 0;

/// Outbound handshake waiting for its ACK.
#[derive(Debug, Clone, Copy)]
struct PendingHandshake {
    fingerprint: Fingerprint,
    connection_id: ConnectionId,
    started: Instant,
}

/// Client protocol state machine.
///
/// # Type Parameters
///
/// - `E`: Environment implementation for time/randomness
pub struct Messenger<E: Environment> {
    env: E,
    identity: Identity,
    config: MessengerConfig,
    peers: PeerDirectory,
    contacts: ContactBook,
    queue: MessageQueue,
    sessions: SessionTable,

    /// Outbound handshakes in flight, at most one per route.
    handshakes: HashMap<Route, PendingHandshake>,

    /// Peers whose direct handshake timed out; the next attempt goes via the
    /// relay.
    prefer_relay: HashSet<Fingerprint>,

    /// Queue flushes due after the settle delay.
    flushes: HashMap<Fingerprint, Instant>,

    last_heartbeat: Option<Instant>,
}

impl<E: Environment> Messenger<E> {
    /// Create a messenger around loaded state.
    pub fn new(
        env: E,
        identity: Identity,
        contacts: ContactBook,
        queue: MessageQueue,
        config: MessengerConfig,
    ) -> Self {
        Self {
            env,
            identity,
            config,
            peers: PeerDirectory::new(),
            contacts,
            queue,
            sessions: SessionTable::new(),
            handshakes: HashMap::new(),
            prefer_relay: HashSet::new(),
            flushes: HashMap::new(),
            last_heartbeat: None,
        }
    }

    /// Our fingerprint.
    pub fn fingerprint(&self) -> Fingerprint {
        self.identity.fingerprint()
    }

    /// Our static public key.
    pub fn public_key(&self) -> &PublicKey {
        self.identity.public_key()
    }

    /// Known peers.
    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    /// Pinned contacts.
    pub fn contacts(&self) -> &ContactBook {
        &self.contacts
    }

    /// Outbox.
    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    /// Live sessions.
    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// True if an outbound handshake to `peer` is waiting for its ACK.
    pub fn handshake_in_progress(&self, peer: &Fingerprint) -> bool {
        self.handshakes.values().any(|h| h.fingerprint == *peer)
    }

    /// Snapshot of every known peer, sorted by name.
    pub fn peer_summaries(&self) -> Vec<PeerSummary> {
        self.peers
            .list()
            .into_iter()
            .map(|peer| PeerSummary {
                name: peer.name.clone(),
                fingerprint: peer.fingerprint,
                route: peer.route,
                state: peer.state,
                connected: self.sessions.established_for(&peer.fingerprint).is_some(),
                pending: self.queue.len(&peer.fingerprint),
            })
            .collect()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// Errors for which [`ClientError::is_droppable`] holds concern a single
    /// inbound datagram; state is unchanged and the caller should log and
    /// carry on. Other errors reject a user request.
    pub fn handle(&mut self, event: MessengerEvent) -> Result<Vec<MessengerAction>, ClientError> {
        match event {
            MessengerEvent::PeerDiscovered { name, addr, public_key } => {
                self.handle_discovery(&name, Route::Direct(addr), public_key)
            },
            MessengerEvent::PeerLost { fingerprint } => Ok(self.handle_peer_lost(fingerprint)),
            MessengerEvent::DatagramReceived { from, datagram } => {
                self.handle_datagram(from, &datagram)
            },
            MessengerEvent::SendMessage { to, text } => self.handle_send(&to, &text),
            MessengerEvent::Connect { to } => {
                let fingerprint = self.resolve(&to)?;
                self.start_handshake(fingerprint)
            },
            MessengerEvent::TransmitFailed { entries } => Ok(self.handle_transmit_failed(entries)),
            MessengerEvent::Tick => self.handle_tick(),
            MessengerEvent::Shutdown => Ok(self.handle_shutdown()),
        }
    }

    /// Record a discovered peer and start a handshake if we are the side
    /// that should.
    fn handle_discovery(
        &mut self,
        name: &str,
        route: Route,
        public_key: PublicKey,
    ) -> Result<Vec<MessengerAction>, ClientError> {
        let fingerprint = public_key.fingerprint();
        if fingerprint == self.fingerprint() {
            return Ok(Vec::new());
        }

        let now = self.env.now();
        let mut actions = Vec::new();

        // Reappearing at another address means the peer restarted and any
        // session we hold points at a dead socket.
        let moved = self.close_moved_sessions(&fingerprint, route);
        if moved {
            actions.push(MessengerAction::SessionClosed { fingerprint, reason: "peer moved".into() });
        }

        // A direct route learned on the LAN beats a relayed one.
        let keep_direct = matches!(route, Route::Relayed(_))
            && self.peers.get(&fingerprint).is_some_and(|p| {
                p.state == PeerState::Known && matches!(p.route, Route::Direct(_))
            });
        if keep_direct {
            self.peers.touch(&fingerprint, now);
        } else {
            match self.peers.discover(name, route, public_key, now) {
                DiscoveryOutcome::New | DiscoveryOutcome::Updated => {
                    tracing::debug!(fingerprint = %fingerprint, route = %route, "peer discovered");
                    actions.push(MessengerAction::PeersUpdated { count: self.peers.len() });
                },
                DiscoveryOutcome::Refreshed => {},
            }
        }

        let has_session = self.sessions.by_fingerprint(&fingerprint).is_some();
        let should_initiate =
            moved || self.fingerprint() < fingerprint || !self.queue.is_empty(&fingerprint);
        if !has_session && !self.handshake_in_progress(&fingerprint) && should_initiate {
            match self.start_handshake(fingerprint) {
                Ok(more) => actions.extend(more),
                Err(e) => tracing::debug!(fingerprint = %fingerprint, error = %e, "no handshake"),
            }
        }

        Ok(actions)
    }

    /// Queue or send a chat message.
    fn handle_send(&mut self, to: &str, text: &str) -> Result<Vec<MessengerAction>, ClientError> {
        if text.len() > MAX_MESSAGE_SIZE {
            return Err(ClientError::MessageTooLarge { size: text.len(), max: MAX_MESSAGE_SIZE });
        }
        let fingerprint = self.resolve(to)?;

        let mut established = self.sessions.established_for(&fingerprint);
        if let Some(cid) = established
            && self.queue.is_empty(&fingerprint)
        {
            let entry = self.entry_for(fingerprint, text);
            match self.seal_entry(cid, entry) {
                Ok(action) => return Ok(vec![action]),
                Err((e, _)) => {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "session unusable");
                    self.sessions.remove(cid);
                    established = None;
                },
            }
        }

        let pending = self.queue.enqueue(
            fingerprint,
            text,
            CHAT_STREAM,
            BTreeMap::new(),
            self.env.unix_time(),
        );
        tracing::info!(fingerprint = %fingerprint, pending, "message queued");
        let mut actions = vec![MessengerAction::Queued { to: fingerprint, pending }];

        if established.is_some() {
            // Older entries are still waiting; this one leaves behind them.
            self.ensure_flush(fingerprint, self.env.now());
        } else if self.peers.get(&fingerprint).is_some() {
            match self.start_handshake(fingerprint) {
                Ok(more) => actions.extend(more),
                Err(e) => tracing::warn!(fingerprint = %fingerprint, error = %e, "cannot reach peer"),
            }
        }
        Ok(actions)
    }

    /// Put entries whose datagram could not be sent back in the queue and
    /// retry them on the next flush.
    fn handle_transmit_failed(&mut self, entries: Vec<QueueEntry>) -> Vec<MessengerAction> {
        let mut grouped: BTreeMap<Fingerprint, Vec<QueueEntry>> = BTreeMap::new();
        for entry in entries {
            grouped.entry(entry.destination).or_default().push(entry);
        }

        let now = self.env.now();
        grouped
            .into_iter()
            .map(|(destination, entries)| {
                self.queue.requeue_front(destination, entries);
                if self.sessions.established_for(&destination).is_some() {
                    self.ensure_flush(destination, now);
                }
                MessengerAction::Queued { to: destination, pending: self.queue.len(&destination) }
            })
            .collect()
    }

    /// Close everything we have with a peer that discovery reports gone.
    ///
    /// Queued messages stay queued; the peer can still be addressed through
    /// its pinned contact and rediscovery starts a fresh handshake.
    fn handle_peer_lost(&mut self, fingerprint: Fingerprint) -> Vec<MessengerAction> {
        let was_connected = self.sessions.established_for(&fingerprint).is_some();
        self.abandon_outbound(&fingerprint);
        for cid in self.sessions.connections_for(&fingerprint) {
            self.sessions.remove(cid);
        }
        self.flushes.remove(&fingerprint);
        self.prefer_relay.remove(&fingerprint);

        let mut actions = Vec::new();
        if was_connected {
            tracing::info!(fingerprint = %fingerprint, "peer went offline");
            actions.push(MessengerAction::SessionClosed {
                fingerprint,
                reason: "peer went offline".into(),
            });
        }
        if self.peers.remove(&fingerprint).is_some() {
            actions.push(MessengerAction::PeersUpdated { count: self.peers.len() });
        }
        actions
    }

    /// Expire handshakes, flush settled queues, heartbeat the relay.
    fn handle_tick(&mut self) -> Result<Vec<MessengerAction>, ClientError> {
        let now = self.env.now();
        let mut actions = Vec::new();

        let expired: Vec<(Route, PendingHandshake)> = self
            .handshakes
            .iter()
            .filter(|(_, h)| now.duration_since(h.started) >= self.config.handshake_timeout)
            .map(|(route, h)| (*route, *h))
            .collect();
        for (route, pending) in expired {
            self.handshakes.remove(&route);
            if self.sessions.get(pending.connection_id).is_some_and(|s| !s.is_established()) {
                self.sessions.remove(pending.connection_id);
            }
            tracing::warn!(fingerprint = %pending.fingerprint, route = %route, "handshake timed out");

            if matches!(route, Route::Direct(_)) && self.config.relay.is_some() {
                self.prefer_relay.insert(pending.fingerprint);
            }
            if !self.queue.is_empty(&pending.fingerprint) {
                match self.start_handshake(pending.fingerprint) {
                    Ok(more) => actions.extend(more),
                    Err(e) => tracing::debug!(error = %e, "handshake retry skipped"),
                }
            }
        }

        let due: Vec<Fingerprint> =
            self.flushes.iter().filter(|(_, at)| **at <= now).map(|(fp, _)| *fp).collect();
        for fingerprint in due {
            self.flushes.remove(&fingerprint);
            actions.extend(self.flush_queue(fingerprint));
        }

        if let Some(relay) = self.config.relay {
            let due = self
                .last_heartbeat
                .is_none_or(|last| now.duration_since(last) >= self.config.heartbeat_interval);
            if due {
                self.last_heartbeat = Some(now);
                actions.extend(self.heartbeat(relay)?);
            }
        }

        Ok(actions)
    }

    /// Say GOODBYE on every session and forget them.
    fn handle_shutdown(&mut self) -> Vec<MessengerAction> {
        self.handshakes.clear();
        self.flushes.clear();

        let mut actions = Vec::new();
        for session in self.sessions.drain() {
            let goodbye = Frame::goodbye(session.connection_id());
            match self.route_frame(session.route(), &goodbye) {
                Ok((to, datagram)) => {
                    actions.push(MessengerAction::Transmit { to, datagram, requeue: None });
                },
                Err(e) => tracing::debug!(peer = %session.peer(), error = %e, "no goodbye"),
            }
        }
        tracing::info!(sessions = actions.len(), "shutting down");
        actions
    }

    fn handle_datagram(
        &mut self,
        from: SocketAddr,
        datagram: &Bytes,
    ) -> Result<Vec<MessengerAction>, ClientError> {
        let via_relay = self.config.relay == Some(from);
        if via_relay && RelayResponse::is_response(datagram) {
            return self.handle_relay_response(&RelayResponse::decode(datagram)?);
        }

        let frame = Frame::decode(datagram)?;
        match frame.frame_type() {
            Some(FrameType::Handshake) => self.handle_handshake(&frame, from, via_relay),
            Some(FrameType::Ack) => self.handle_ack(&frame),
            Some(FrameType::Data) => self.handle_data(&frame),
            Some(FrameType::Goodbye) => Ok(self.handle_goodbye(&frame)),
            None => Err(ProtocolError::UnknownFrameType(frame.header.frame_type_raw()).into()),
        }
    }

    /// Responder side of the handshake.
    fn handle_handshake(
        &mut self,
        frame: &Frame,
        from: SocketAddr,
        via_relay: bool,
    ) -> Result<Vec<MessengerAction>, ClientError> {
        let cid = frame.connection_id();
        if let Some(existing) = self.sessions.get(cid) {
            // Retransmitted HANDSHAKE: our ACK was probably lost.
            if existing.role() == Role::Responder {
                let ack = self.sessions.ack_frame(cid)?;
                let (to, datagram) = self.route_frame(existing.route(), &ack)?;
                return Ok(vec![MessengerAction::Transmit { to, datagram, requeue: None }]);
            }
            tracing::debug!(connection = %cid, "handshake on our own connection id");
            return Ok(Vec::new());
        }

        let init = HandshakeInit::decode(&frame.payload)?;
        let (remote_key, keys) = respond(self.identity.keypair(), &init)?;
        let fingerprint = remote_key.fingerprint();
        if fingerprint == self.fingerprint() {
            return Ok(Vec::new());
        }
        let route = if via_relay { Route::Relayed(fingerprint) } else { Route::Direct(from) };

        if self.handshake_in_progress(&fingerprint) {
            if self.fingerprint() < fingerprint {
                tracing::debug!(fingerprint = %fingerprint, "crossed handshake, keeping ours");
                return Ok(Vec::new());
            }
            tracing::debug!(fingerprint = %fingerprint, "crossed handshake, yielding");
            self.abandon_outbound(&fingerprint);
        }

        let announced = self.peers.get(&fingerprint).map(|p| p.name.clone());
        let decision = self.contacts.verify_or_add(
            fingerprint,
            &remote_key,
            announced.as_deref(),
            self.env.unix_time(),
        );
        if !decision.is_trusted() {
            return Ok(vec![MessengerAction::TrustWarning {
                fingerprint,
                message: decision.to_string(),
            }]);
        }

        let now = self.env.now();
        let name = self.contacts.name_for(fingerprint);
        self.peers.learn_pending(&name, route, remote_key, now);
        self.peers.touch(&fingerprint, now);

        // A fresh handshake replaces whatever we had with this peer.
        for old in self.sessions.connections_for(&fingerprint) {
            self.sessions.remove(old);
        }
        self.sessions.insert(Session::new(cid, fingerprint, route, Role::Responder, keys, now))?;

        let ack = self.sessions.ack_frame(cid)?;
        let (to, datagram) = self.route_frame(route, &ack)?;
        tracing::info!(fingerprint = %fingerprint, connection = %cid, route = %route, "session accepted");

        self.schedule_flush(fingerprint, now);
        Ok(vec![
            MessengerAction::Transmit { to, datagram, requeue: None },
            MessengerAction::SessionEstablished { fingerprint, name: self.display_name(fingerprint) },
        ])
    }

    /// Initiator side: the responder proved it holds the key we addressed.
    fn handle_ack(&mut self, frame: &Frame) -> Result<Vec<MessengerAction>, ClientError> {
        let cid = frame.connection_id();
        if self.sessions.get(cid).is_some_and(Session::is_established) {
            return Ok(Vec::new());
        }

        let fingerprint = self.sessions.confirm(frame)?;
        self.handshakes.retain(|_, h| h.connection_id != cid);

        if let Some(peer) = self.peers.get(&fingerprint) {
            let (public_key, announced) = (peer.public_key, peer.name.clone());
            let decision = self.contacts.verify_or_add(
                fingerprint,
                &public_key,
                Some(&announced),
                self.env.unix_time(),
            );
            if !decision.is_trusted() {
                self.sessions.remove(cid);
                return Ok(vec![MessengerAction::TrustWarning {
                    fingerprint,
                    message: decision.to_string(),
                }]);
            }
        }
        for old in self.sessions.connections_for(&fingerprint) {
            if old != cid {
                self.sessions.remove(old);
            }
        }

        let now = self.env.now();
        self.peers.touch(&fingerprint, now);
        self.schedule_flush(fingerprint, now);
        tracing::info!(fingerprint = %fingerprint, connection = %cid, "session established");

        Ok(vec![MessengerAction::SessionEstablished {
            fingerprint,
            name: self.display_name(fingerprint),
        }])
    }

    fn handle_data(&mut self, frame: &Frame) -> Result<Vec<MessengerAction>, ClientError> {
        let opened = self.sessions.open(frame)?;
        let peer = opened.peer;
        self.peers.touch(&peer, self.env.now());
        let text =
            String::from_utf8(opened.plaintext).map_err(|_| ClientError::InvalidText(peer))?;

        Ok(vec![MessengerAction::Deliver {
            from: peer,
            name: self.display_name(peer),
            stream_id: opened.stream_id,
            text,
        }])
    }

    fn handle_goodbye(&mut self, frame: &Frame) -> Vec<MessengerAction> {
        let cid = frame.connection_id();
        let Some(session) = self.sessions.remove(cid) else {
            tracing::debug!(connection = %cid, "goodbye for unknown connection");
            return Vec::new();
        };
        self.handshakes.retain(|_, h| h.connection_id != cid);

        let fingerprint = session.peer();
        if self.sessions.established_for(&fingerprint).is_none() {
            self.flushes.remove(&fingerprint);
        }
        tracing::info!(fingerprint = %fingerprint, connection = %cid, "peer said goodbye");

        vec![MessengerAction::SessionClosed { fingerprint, reason: "peer said goodbye".into() }]
    }

    fn handle_relay_response(
        &mut self,
        response: &RelayResponse,
    ) -> Result<Vec<MessengerAction>, ClientError> {
        let entries = match response {
            RelayResponse::RegisterAck { fingerprint } => {
                tracing::debug!(fingerprint = %fingerprint, "registered with relay");
                return Ok(Vec::new());
            },
            RelayResponse::PeerList(entries) => entries,
        };

        let mut actions = Vec::new();
        let mut updated = false;
        for entry in entries {
            if entry.fingerprint == self.fingerprint() {
                continue;
            }
            let Ok(public_key) = PublicKey::from_slice(&entry.public_key) else {
                tracing::debug!(fingerprint = %entry.fingerprint, "peer list entry with bad key");
                continue;
            };
            if public_key.fingerprint() != entry.fingerprint {
                tracing::warn!(fingerprint = %entry.fingerprint, "peer list key does not match fingerprint");
                continue;
            }

            for action in
                self.handle_discovery(&entry.name, Route::Relayed(entry.fingerprint), public_key)?
            {
                if matches!(action, MessengerAction::PeersUpdated { .. }) {
                    updated = true;
                } else {
                    actions.push(action);
                }
            }
        }

        if updated {
            actions.push(MessengerAction::PeersUpdated { count: self.peers.len() });
        }
        Ok(actions)
    }

    /// Begin an IK handshake with a known peer.
    ///
    /// The in-progress marker is set before the HANDSHAKE leaves, so a second
    /// attempt on the same route is a no-op until it clears.
    fn start_handshake(
        &mut self,
        fingerprint: Fingerprint,
    ) -> Result<Vec<MessengerAction>, ClientError> {
        let peer = self
            .peers
            .get(&fingerprint)
            .ok_or_else(|| ClientError::UnknownPeer(fingerprint.to_string()))?;
        let remote_key = peer.public_key;
        let route = match peer.route {
            Route::Direct(_)
                if self.config.relay.is_some() && self.prefer_relay.contains(&fingerprint) =>
            {
                Route::Relayed(fingerprint)
            },
            route => route,
        };

        if self.handshakes.contains_key(&route) || self.handshake_in_progress(&fingerprint) {
            return Ok(Vec::new());
        }

        let cid = self.fresh_connection_id();
        let (init, keys) = initiate(self.identity.keypair(), &remote_key, self.env.random_key())?;
        let frame = Frame::new(FrameType::Handshake, cid, 0, init.to_bytes());
        let (to, datagram) = self.route_frame(route, &frame)?;

        let now = self.env.now();
        self.handshakes.insert(route, PendingHandshake { fingerprint, connection_id: cid, started: now });
        self.sessions.insert(Session::new(cid, fingerprint, route, Role::Initiator, keys, now))?;
        tracing::info!(fingerprint = %fingerprint, connection = %cid, route = %route, "handshake started");

        Ok(vec![MessengerAction::Transmit { to, datagram, requeue: None }])
    }

    /// Drop our outbound handshake to `fingerprint`.
    fn abandon_outbound(&mut self, fingerprint: &Fingerprint) {
        let abandoned: Vec<ConnectionId> = self
            .handshakes
            .values()
            .filter(|h| h.fingerprint == *fingerprint)
            .map(|h| h.connection_id)
            .collect();
        self.handshakes.retain(|_, h| h.fingerprint != *fingerprint);
        for cid in abandoned {
            self.sessions.remove(cid);
        }
    }

    /// Send everything queued for `fingerprint` if a session is up.
    fn flush_queue(&mut self, fingerprint: Fingerprint) -> Vec<MessengerAction> {
        let Some(cid) = self.sessions.established_for(&fingerprint) else {
            return Vec::new();
        };
        let entries = self.queue.flush(fingerprint);
        if entries.is_empty() {
            return Vec::new();
        }
        tracing::info!(fingerprint = %fingerprint, count = entries.len(), "flushing queue");

        let mut actions = Vec::with_capacity(entries.len());
        let mut remaining = entries.into_iter();
        while let Some(entry) = remaining.next() {
            match self.seal_entry(cid, entry) {
                Ok(action) => actions.push(action),
                Err((e, entry)) => {
                    tracing::warn!(fingerprint = %fingerprint, error = %e, "flush interrupted");
                    let mut unsent = vec![entry];
                    unsent.extend(remaining);
                    self.queue.requeue_front(fingerprint, unsent);
                    break;
                },
            }
        }
        actions
    }

    /// Encrypt a queue entry into a `Transmit` that can hand it back on
    /// failure.
    fn seal_entry(
        &mut self,
        cid: ConnectionId,
        entry: QueueEntry,
    ) -> Result<MessengerAction, (ClientError, QueueEntry)> {
        let route = match self.sessions.get(cid) {
            Some(session) => session.route(),
            None => {
                return Err((SessionError::UnknownConnection(cid).into(), entry));
            },
        };
        let frame = match self.sessions.seal(cid, entry.stream_id, entry.text.as_bytes()) {
            Ok(frame) => frame,
            Err(e) => return Err((e.into(), entry)),
        };
        match self.route_frame(route, &frame) {
            Ok((to, datagram)) => {
                Ok(MessengerAction::Transmit { to, datagram, requeue: Some(entry) })
            },
            Err(e) => Err((e, entry)),
        }
    }

    /// REGISTER followed by PEER_LIST_REQUEST.
    fn heartbeat(&self, relay: SocketAddr) -> Result<Vec<MessengerAction>, ClientError> {
        let fingerprint = self.fingerprint();
        let register = RelayRequest::register(
            fingerprint,
            &self.config.display_name,
            self.public_key().as_bytes().to_vec(),
        );
        let list = RelayRequest::PeerListRequest { requester: fingerprint };

        Ok(vec![
            MessengerAction::Transmit { to: relay, datagram: register.encode()?, requeue: None },
            MessengerAction::Transmit { to: relay, datagram: list.encode()?, requeue: None },
        ])
    }

    /// Encode a frame for `route`, wrapping it in a RELAY request when the
    /// peer is only reachable through the relay.
    fn route_frame(
        &self,
        route: Route,
        frame: &Frame,
    ) -> Result<(SocketAddr, Bytes), ClientError> {
        let encoded = frame.to_bytes()?;
        match route {
            Route::Direct(addr) => Ok((addr, encoded)),
            Route::Relayed(destination) => {
                let relay = self.config.relay.ok_or(ClientError::NoRoute(destination))?;
                let wrapped = RelayRequest::Relay { destination, payload: encoded }.encode()?;
                Ok((relay, wrapped))
            },
        }
    }

    /// Drop sessions over a direct route the peer has just moved away from.
    /// Returns true if any were closed.
    fn close_moved_sessions(&mut self, fingerprint: &Fingerprint, route: Route) -> bool {
        let Route::Direct(addr) = route else {
            return false;
        };
        let known_elsewhere = self
            .peers
            .get(fingerprint)
            .is_some_and(|p| {
                p.state == PeerState::Known && matches!(p.route, Route::Direct(old) if old != addr)
            });
        if !known_elsewhere {
            return false;
        }

        let stale: Vec<ConnectionId> = self
            .sessions
            .connections_for(fingerprint)
            .into_iter()
            .filter(|cid| {
                self.sessions
                    .get(*cid)
                    .is_some_and(|s| matches!(s.route(), Route::Direct(old) if old != addr))
            })
            .collect();
        if stale.is_empty() {
            return false;
        }

        self.handshakes.retain(|_, h| !stale.contains(&h.connection_id));
        for cid in stale {
            self.sessions.remove(cid);
        }
        if self.sessions.established_for(fingerprint).is_none() {
            self.flushes.remove(fingerprint);
        }
        tracing::info!(fingerprint = %fingerprint, addr = %addr, "peer moved, closing stale session");
        true
    }

    fn schedule_flush(&mut self, fingerprint: Fingerprint, now: Instant) {
        self.flushes.insert(fingerprint, now + self.config.flush_settle_delay);
    }

    /// Schedule a flush unless one is already due sooner.
    fn ensure_flush(&mut self, fingerprint: Fingerprint, now: Instant) {
        self.flushes.entry(fingerprint).or_insert(now + self.config.flush_settle_delay);
    }

    fn fresh_connection_id(&self) -> ConnectionId {
        loop {
            let cid = ConnectionId(self.env.random_u64());
            if cid.0 != 0 && !self.sessions.contains(cid) {
                return cid;
            }
        }
    }

    fn resolve(&self, name_or_fingerprint: &str) -> Result<Fingerprint, ClientError> {
        if let Some(peer) = self.peers.lookup(name_or_fingerprint) {
            return Ok(peer.fingerprint);
        }
        // Pinned contacts can be queued for even when they are offline.
        Fingerprint::parse(name_or_fingerprint)
            .ok()
            .filter(|fp| self.contacts.get(fp).is_some())
            .or_else(|| {
                self.contacts
                    .list()
                    .into_iter()
                    .find(|(_, c)| c.name == name_or_fingerprint)
                    .map(|(fp, _)| fp)
            })
            .ok_or_else(|| ClientError::UnknownPeer(name_or_fingerprint.to_owned()))
    }

    fn display_name(&self, fingerprint: Fingerprint) -> String {
        match self.peers.get(&fingerprint) {
            Some(peer) if peer.state == PeerState::Known => peer.name.clone(),
            _ => self.contacts.name_for(fingerprint),
        }
    }

    fn entry_for(&self, destination: Fingerprint, text: &str) -> QueueEntry {
        QueueEntry {
            destination,
            text: text.to_owned(),
            stream_id: CHAT_STREAM,
            enqueued_at: self.env.unix_time(),
            metadata: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::{
        future::Future,
        net::{Ipv4Addr, SocketAddrV4},
        sync::{
            Arc, Mutex,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use parley_crypto::StaticKeypair;

    use super::*;

    #[derive(Clone)]
    struct TestEnv {
        start: Instant,
        elapsed: Arc<Mutex<Duration>>,
        draws: Arc<AtomicU64>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self {
                start: Instant::now(),
                elapsed: Arc::new(Mutex::new(Duration::ZERO)),
                draws: Arc::new(AtomicU64::new(1)),
            }
        }

        fn advance(&self, by: Duration) {
            *self.elapsed.lock().unwrap() += by;
        }
    }

    impl Environment for TestEnv {
        fn now(&self) -> Instant {
            self.start + *self.elapsed.lock().unwrap()
        }

        fn unix_time(&self) -> u64 {
            1_700_000_000 + self.elapsed.lock().unwrap().as_secs()
        }

        fn sleep(&self, _duration: Duration) -> impl Future<Output = ()> + Send {
            std::future::ready(())
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            // Distinct per draw so connection ids never repeat.
            let draw = self.draws.fetch_add(1, Ordering::Relaxed).to_be_bytes();
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = draw[i % 8] ^ (i as u8).wrapping_mul(37);
            }
        }
    }

    fn addr(host: u8) -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, host), 4443))
    }

    fn relay_addr() -> SocketAddr {
        SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 254), 7777))
    }

    fn messenger(secret: u8, config: MessengerConfig) -> (Messenger<TestEnv>, TestEnv) {
        let env = TestEnv::new();
        let identity = Identity::from_keypair(StaticKeypair::from_secret_bytes([secret; 32]));
        let m = Messenger::new(
            env.clone(),
            identity,
            ContactBook::in_memory(),
            MessageQueue::in_memory(),
            config,
        );
        (m, env)
    }

    fn datagrams(actions: &[MessengerAction]) -> Vec<Bytes> {
        actions
            .iter()
            .filter_map(|a| match a {
                MessengerAction::Transmit { datagram, .. } => Some(datagram.clone()),
                _ => None,
            })
            .collect()
    }

    /// Hand every datagram in `actions` to `to`, as if it came from `from`.
    fn pump(
        actions: &[MessengerAction],
        from: SocketAddr,
        to: &mut Messenger<TestEnv>,
    ) -> Vec<MessengerAction> {
        datagrams(actions)
            .into_iter()
            .flat_map(|datagram| {
                to.handle(MessengerEvent::DatagramReceived { from, datagram }).unwrap()
            })
            .collect()
    }

    // Secret [0x22; 32] has the smaller fingerprint of the two.
    fn alice_and_bob() -> ((Messenger<TestEnv>, TestEnv), (Messenger<TestEnv>, TestEnv)) {
        let alice = messenger(0x11, MessengerConfig::default());
        let bob = messenger(0x22, MessengerConfig::default());
        assert!(bob.0.fingerprint() < alice.0.fingerprint());
        (alice, bob)
    }

    fn discover(m: &mut Messenger<TestEnv>, name: &str, at: SocketAddr, key: PublicKey) -> Vec<MessengerAction> {
        m.handle(MessengerEvent::PeerDiscovered { name: name.into(), addr: at, public_key: key })
            .unwrap()
    }

    /// Alice at `addr(1)`, bob at `addr(2)`; bob initiates.
    fn connect_pair(alice: &mut Messenger<TestEnv>, bob: &mut Messenger<TestEnv>) {
        let alice_key = *alice.public_key();
        discover(alice, "bob", addr(2), *bob.public_key());
        let hello = discover(bob, "alice", addr(1), alice_key);
        let reply = pump(&hello, addr(2), alice);
        pump(&reply, addr(1), bob);
        assert!(bob.sessions().established_for(&alice.fingerprint()).is_some());
    }

    fn delivered_texts(actions: Vec<MessengerAction>) -> Vec<String> {
        actions
            .into_iter()
            .filter_map(|a| match a {
                MessengerAction::Deliver { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn smaller_fingerprint_initiates() {
        let ((mut alice, _), (mut bob, _)) = alice_and_bob();
        let alice_key = *alice.public_key();
        let bob_key = *bob.public_key();

        let from_alice = discover(&mut alice, "bob", addr(2), bob_key);
        let from_bob = discover(&mut bob, "alice", addr(1), alice_key);

        assert!(datagrams(&from_alice).is_empty());
        assert_eq!(datagrams(&from_bob).len(), 1);
        assert!(bob.handshake_in_progress(&alice.fingerprint()));
    }

    #[test]
    fn handshake_then_messages_both_ways() {
        let ((mut alice, _), (mut bob, _)) = alice_and_bob();
        let alice_key = *alice.public_key();
        let bob_key = *bob.public_key();
        discover(&mut alice, "bob", addr(2), bob_key);
        let hello = discover(&mut bob, "alice", addr(1), alice_key);

        let reply = pump(&hello, addr(2), &mut alice);
        assert!(reply.contains(&MessengerAction::SessionEstablished {
            fingerprint: bob.fingerprint(),
            name: "bob".into()
        }));
        let confirmed = pump(&reply, addr(1), &mut bob);
        assert_eq!(
            confirmed,
            vec![MessengerAction::SessionEstablished {
                fingerprint: alice.fingerprint(),
                name: "alice".into()
            }]
        );
        assert!(!bob.handshake_in_progress(&alice.fingerprint()));

        let sent = alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "hi bob".into() })
            .unwrap();
        assert_eq!(
            pump(&sent, addr(1), &mut bob),
            vec![MessengerAction::Deliver {
                from: alice.fingerprint(),
                name: "alice".into(),
                stream_id: 0,
                text: "hi bob".into()
            }]
        );

        let sent = bob
            .handle(MessengerEvent::SendMessage { to: "alice".into(), text: "hi alice".into() })
            .unwrap();
        let delivered = pump(&sent, addr(2), &mut alice);
        assert!(matches!(&delivered[..], [MessengerAction::Deliver { text, .. }] if text == "hi alice"));
    }

    #[test]
    fn replayed_data_is_dropped() {
        let ((mut alice, _), (mut bob, _)) = alice_and_bob();
        let alice_key = *alice.public_key();
        discover(&mut alice, "bob", addr(2), *bob.public_key());
        let hello = discover(&mut bob, "alice", addr(1), alice_key);
        let reply = pump(&hello, addr(2), &mut alice);
        pump(&reply, addr(1), &mut bob);

        let sent = alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "once".into() })
            .unwrap();
        pump(&sent, addr(1), &mut bob);

        let datagram = datagrams(&sent).remove(0);
        let err = bob.handle(MessengerEvent::DatagramReceived { from: addr(1), datagram }).unwrap_err();
        assert!(err.is_droppable());
    }

    #[test]
    fn send_without_session_queues_and_starts_handshake() {
        let ((mut alice, _), (bob, _)) = alice_and_bob();
        discover(&mut alice, "bob", addr(2), *bob.public_key());

        let actions = alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "later".into() })
            .unwrap();

        assert_eq!(actions[0], MessengerAction::Queued { to: bob.fingerprint(), pending: 1 });
        assert_eq!(datagrams(&actions).len(), 1);
        assert!(alice.handshake_in_progress(&bob.fingerprint()));

        // Second message does not start a second handshake.
        let actions = alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "later 2".into() })
            .unwrap();
        assert_eq!(actions, vec![MessengerAction::Queued { to: bob.fingerprint(), pending: 2 }]);
    }

    #[test]
    fn queue_flushes_after_settle_delay() {
        let ((mut alice, alice_env), (mut bob, _)) = alice_and_bob();
        discover(&mut alice, "bob", addr(2), *bob.public_key());

        let first = alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "one".into() })
            .unwrap();
        alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "two".into() })
            .unwrap();

        let reply = pump(&first, addr(1), &mut bob);
        pump(&reply, addr(2), &mut alice);

        assert!(datagrams(&alice.handle(MessengerEvent::Tick).unwrap()).is_empty());
        alice_env.advance(Duration::from_millis(500));
        let flushed = alice.handle(MessengerEvent::Tick).unwrap();
        assert!(alice.queue().is_empty(&bob.fingerprint()));

        let texts: Vec<String> = pump(&flushed, addr(1), &mut bob)
            .into_iter()
            .filter_map(|a| match a {
                MessengerAction::Deliver { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(texts, ["one", "two"]);
    }

    #[test]
    fn failed_transmit_requeues_at_front() {
        let ((mut alice, _), (bob, _)) = alice_and_bob();
        discover(&mut alice, "bob", addr(2), *bob.public_key());
        alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "third".into() })
            .unwrap();

        let failed = ["first", "second"]
            .into_iter()
            .map(|text| QueueEntry {
                destination: bob.fingerprint(),
                text: text.into(),
                stream_id: 0,
                enqueued_at: 0,
                metadata: BTreeMap::new(),
            })
            .collect();
        let actions = alice.handle(MessengerEvent::TransmitFailed { entries: failed }).unwrap();

        assert_eq!(actions, vec![MessengerAction::Queued { to: bob.fingerprint(), pending: 3 }]);
    }

    #[test]
    fn handshake_timeout_switches_to_relay() {
        let config = MessengerConfig { relay: Some(relay_addr()), ..Default::default() };
        let (mut bob, env) = messenger(0x22, config);
        let (alice, _) = messenger(0x11, MessengerConfig::default());
        bob.handle(MessengerEvent::Tick).unwrap();

        let first = discover(&mut bob, "alice", addr(1), *alice.public_key());
        assert!(matches!(&first[..], [_, MessengerAction::Transmit { to, .. }] if *to == addr(1)));
        bob.handle(MessengerEvent::SendMessage { to: "alice".into(), text: "hello?".into() })
            .unwrap();

        env.advance(Duration::from_secs(9));
        bob.handle(MessengerEvent::Tick).unwrap();
        assert!(bob.handshake_in_progress(&alice.fingerprint()));

        env.advance(Duration::from_secs(1));
        let retry = bob.handle(MessengerEvent::Tick).unwrap();
        let relayed: Vec<_> = datagrams(&retry)
            .iter()
            .filter_map(|d| match RelayRequest::decode(d) {
                Ok(RelayRequest::Relay { destination, payload }) => Some((destination, payload)),
                _ => None,
            })
            .collect();
        assert_eq!(relayed.len(), 1);
        assert_eq!(relayed[0].0, alice.fingerprint());
        assert_eq!(
            Frame::decode(&relayed[0].1).unwrap().frame_type(),
            Some(FrameType::Handshake)
        );
        assert_eq!(bob.sessions().len(), 1);
    }

    #[test]
    fn heartbeat_registers_and_requests_peers() {
        let config = MessengerConfig { relay: Some(relay_addr()), ..Default::default() };
        let (mut alice, env) = messenger(0x11, config);

        let actions = alice.handle(MessengerEvent::Tick).unwrap();
        let sent = datagrams(&actions);
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            RelayRequest::decode(&sent[0]).unwrap(),
            RelayRequest::Register { fingerprint, .. } if fingerprint == alice.fingerprint()
        ));
        assert!(matches!(
            RelayRequest::decode(&sent[1]).unwrap(),
            RelayRequest::PeerListRequest { .. }
        ));

        env.advance(Duration::from_secs(5));
        assert!(alice.handle(MessengerEvent::Tick).unwrap().is_empty());
        env.advance(Duration::from_secs(5));
        assert_eq!(datagrams(&alice.handle(MessengerEvent::Tick).unwrap()).len(), 2);
    }

    #[test]
    fn peer_list_rejects_forged_entries() {
        let config = MessengerConfig { relay: Some(relay_addr()), ..Default::default() };
        let (mut alice, _) = messenger(0x11, config);
        let (bob, _) = messenger(0x22, MessengerConfig::default());
        let (mallory, _) = messenger(0x33, MessengerConfig::default());

        let list = RelayResponse::PeerList(vec![
            parley_proto::PeerEntry {
                fingerprint: bob.fingerprint(),
                name: "bob".into(),
                public_key: mallory.public_key().as_bytes().to_vec(),
            },
            parley_proto::PeerEntry {
                fingerprint: alice.fingerprint(),
                name: "me".into(),
                public_key: alice.public_key().as_bytes().to_vec(),
            },
        ]);
        let actions = alice
            .handle(MessengerEvent::DatagramReceived {
                from: relay_addr(),
                datagram: list.encode().unwrap(),
            })
            .unwrap();

        assert!(actions.is_empty());
        assert!(alice.peers().is_empty());
    }

    #[test]
    fn unknown_peer_is_rejected() {
        let (mut alice, _) = messenger(0x11, MessengerConfig::default());
        let err = alice
            .handle(MessengerEvent::SendMessage { to: "nobody".into(), text: "hi".into() })
            .unwrap_err();
        assert!(matches!(err, ClientError::UnknownPeer(_)));
    }

    #[test]
    fn oversized_message_is_rejected() {
        let ((mut alice, _), (bob, _)) = alice_and_bob();
        discover(&mut alice, "bob", addr(2), *bob.public_key());
        let text = "x".repeat(MAX_MESSAGE_SIZE + 1);
        let err = alice.handle(MessengerEvent::SendMessage { to: "bob".into(), text }).unwrap_err();
        assert!(matches!(err, ClientError::MessageTooLarge { .. }));
    }

    #[test]
    fn garbage_is_droppable() {
        let (mut alice, _) = messenger(0x11, MessengerConfig::default());
        let err = alice
            .handle(MessengerEvent::DatagramReceived {
                from: addr(9),
                datagram: Bytes::from_static(b"\x00\x00\x00\x02zz"),
            })
            .unwrap_err();
        assert!(err.is_droppable());
    }

    #[test]
    fn failed_send_is_retried_before_newer_messages() {
        let ((mut alice, alice_env), (mut bob, _)) = alice_and_bob();
        connect_pair(&mut alice, &mut bob);
        alice_env.advance(Duration::from_millis(500));
        alice.handle(MessengerEvent::Tick).unwrap();

        let sent = alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "first".into() })
            .unwrap();
        let [MessengerAction::Transmit { requeue: Some(entry), .. }] = &sent[..] else {
            panic!("expected one transmit, got {sent:?}");
        };
        alice.handle(MessengerEvent::TransmitFailed { entries: vec![entry.clone()] }).unwrap();

        // The session is up, but "first" is still waiting, so "second" queues behind it.
        let second = alice
            .handle(MessengerEvent::SendMessage { to: "bob".into(), text: "second".into() })
            .unwrap();
        assert_eq!(second, vec![MessengerAction::Queued { to: bob.fingerprint(), pending: 2 }]);
        assert!(datagrams(&alice.handle(MessengerEvent::Tick).unwrap()).is_empty());

        alice_env.advance(Duration::from_millis(500));
        let flushed = alice.handle(MessengerEvent::Tick).unwrap();
        assert!(alice.queue().is_empty(&bob.fingerprint()));
        assert_eq!(delivered_texts(pump(&flushed, addr(1), &mut bob)), ["first", "second"]);
    }

    #[test]
    fn restarted_peer_at_new_address_gets_fresh_session() {
        let ((mut alice, _), (mut bob, _)) = alice_and_bob();
        connect_pair(&mut alice, &mut bob);

        // Alice comes back with the same identity on another address and
        // never said goodbye.
        let (mut alice, _) = messenger(0x11, MessengerConfig::default());
        let alice_key = *alice.public_key();
        assert!(datagrams(&discover(&mut alice, "bob", addr(2), *bob.public_key())).is_empty());

        let hello = discover(&mut bob, "alice", addr(3), alice_key);
        assert_eq!(
            hello[0],
            MessengerAction::SessionClosed { fingerprint: alice.fingerprint(), reason: "peer moved".into() }
        );
        assert!(matches!(hello.last(), Some(MessengerAction::Transmit { to, .. }) if *to == addr(3)));

        let reply = pump(&hello, addr(2), &mut alice);
        pump(&reply, addr(3), &mut bob);

        let sent = bob
            .handle(MessengerEvent::SendMessage { to: "alice".into(), text: "welcome back".into() })
            .unwrap();
        assert!(matches!(&sent[..], [MessengerAction::Transmit { to, .. }] if *to == addr(3)));
        assert_eq!(delivered_texts(pump(&sent, addr(2), &mut alice)), ["welcome back"]);

        // Later announcements from the new address leave the session alone.
        let again = discover(&mut bob, "alice", addr(3), alice_key);
        assert!(again.is_empty());
        assert!(bob.sessions().established_for(&alice.fingerprint()).is_some());
    }

    #[test]
    fn lost_peer_closes_session_and_keeps_messages() {
        let ((mut alice, _), (mut bob, bob_env)) = alice_and_bob();
        connect_pair(&mut alice, &mut bob);
        let alice_fp = alice.fingerprint();

        let actions = bob.handle(MessengerEvent::PeerLost { fingerprint: alice_fp }).unwrap();
        assert_eq!(
            actions,
            vec![
                MessengerAction::SessionClosed {
                    fingerprint: alice_fp,
                    reason: "peer went offline".into()
                },
                MessengerAction::PeersUpdated { count: 0 },
            ]
        );
        assert!(bob.sessions().is_empty());
        assert!(bob.peers().is_empty());
        assert!(bob.handle(MessengerEvent::PeerLost { fingerprint: alice_fp }).unwrap().is_empty());

        // The pinned contact still resolves, so the message waits.
        let queued = bob
            .handle(MessengerEvent::SendMessage { to: "alice".into(), text: "are you there?".into() })
            .unwrap();
        assert_eq!(queued, vec![MessengerAction::Queued { to: alice_fp, pending: 1 }]);

        let hello = discover(&mut bob, "alice", addr(1), *alice.public_key());
        assert_eq!(datagrams(&hello).len(), 1);
        let reply = pump(&hello, addr(2), &mut alice);
        pump(&reply, addr(1), &mut bob);

        bob_env.advance(Duration::from_millis(500));
        let flushed = bob.handle(MessengerEvent::Tick).unwrap();
        assert_eq!(delivered_texts(pump(&flushed, addr(2), &mut alice)), ["are you there?"]);
    }

    #[test]
    fn non_utf8_text_is_dropped() {
        let ((mut alice, _), (mut bob, _)) = alice_and_bob();
        connect_pair(&mut alice, &mut bob);

        let cid = bob.sessions.established_for(&alice.fingerprint()).unwrap();
        let frame = bob.sessions.seal(cid, CHAT_STREAM, &[0xff, 0xfe, 0xfd]).unwrap();
        let err = alice
            .handle(MessengerEvent::DatagramReceived {
                from: addr(2),
                datagram: frame.to_bytes().unwrap(),
            })
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidText(fp) if fp == bob.fingerprint()));
        assert!(err.is_droppable());

        let sent = bob
            .handle(MessengerEvent::SendMessage { to: "alice".into(), text: "fine".into() })
            .unwrap();
        assert_eq!(delivered_texts(pump(&sent, addr(2), &mut alice)), ["fine"]);
    }

    proptest::proptest! {
        #[test]
        fn arbitrary_datagrams_leave_state_untouched(
            datagram in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..256),
        ) {
            let config = MessengerConfig { relay: Some(relay_addr()), ..Default::default() };
            let (mut alice, _) = messenger(0x11, config);
            let _ = alice.handle(MessengerEvent::DatagramReceived {
                from: relay_addr(),
                datagram: Bytes::from(datagram),
            });
            proptest::prop_assert!(alice.sessions().is_empty());
            proptest::prop_assert!(alice.contacts().is_empty());
        }
    }
}
