//! Per-peer secure sessions and the table that multiplexes them.
//!
//! One UDP socket carries many sessions; the 64-bit connection id in every
//! frame header selects the session. A session owns the directional keys from
//! its handshake and the two sequence counters that drive the AEAD nonces.
//!
//! # Invariants
//!
//! - `send_sequence` only grows; a sequence number is never sealed twice.
//! - A DATA frame opens only if its sequence is at least `recv_sequence`;
//!   on success `recv_sequence` moves past it. Gaps are tolerated, replays
//!   and older datagrams are not.
//! - Removing a session drops (and so zeroizes) its keys.

use std::{collections::HashMap, time::Instant};

use bytes::Bytes;
use parley_crypto::{ACK_SEQUENCE, Role, SessionKeys};
use parley_proto::{ConnectionId, Fingerprint, Frame, FrameType, HandshakeAck, SealedData};

use crate::{error::SessionError, peer::Route};

/// An authenticated channel to one peer.
#[derive(Debug)]
pub struct Session {
    connection_id: ConnectionId,
    peer: Fingerprint,
    route: Route,
    role: Role,
    keys: SessionKeys,
    send_sequence: u64,
    recv_sequence: u64,
    established: bool,
    created_at: Instant,
}

impl Session {
    /// New session from completed handshake keys.
    ///
    /// Responder sessions are established immediately; initiator sessions
    /// wait for the responder's ACK.
    pub fn new(
        connection_id: ConnectionId,
        peer: Fingerprint,
        route: Route,
        role: Role,
        keys: SessionKeys,
        now: Instant,
    ) -> Self {
        Self {
            connection_id,
            peer,
            route,
            role,
            keys,
            send_sequence: 0,
            recv_sequence: 0,
            established: role == Role::Responder,
            created_at: now,
        }
    }

    /// Connection id.
    pub const fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Remote fingerprint.
    pub const fn peer(&self) -> Fingerprint {
        self.peer
    }

    /// Route frames for this session take.
    pub const fn route(&self) -> Route {
        self.route
    }

    /// Handshake role.
    pub const fn role(&self) -> Role {
        self.role
    }

    /// True once traffic may flow.
    pub const fn is_established(&self) -> bool {
        self.established
    }

    /// Next sequence number to seal.
    pub const fn send_sequence(&self) -> u64 {
        self.send_sequence
    }

    /// Lowest sequence number still accepted.
    pub const fn recv_sequence(&self) -> u64 {
        self.recv_sequence
    }

    /// Creation time.
    pub const fn created_at(&self) -> Instant {
        self.created_at
    }
}

/// Decrypted DATA frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Opened {
    /// Sender.
    pub peer: Fingerprint,
    /// Stream the message arrived on.
    pub stream_id: u16,
    /// Sequence number the sender used.
    pub sequence: u64,
    /// Plaintext.
    pub plaintext: Vec<u8>,
}

/// All live sessions, indexed by connection id and by peer.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<ConnectionId, Session>,
    by_peer: HashMap<Fingerprint, ConnectionId>,
}

impl SessionTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. The peer index points at the newest session.
    ///
    /// # Errors
    ///
    /// `DuplicateConnection` if the connection id is taken.
    pub fn insert(&mut self, session: Session) -> Result<(), SessionError> {
        let cid = session.connection_id;
        if self.sessions.contains_key(&cid) {
            return Err(SessionError::DuplicateConnection(cid));
        }
        self.by_peer.insert(session.peer, cid);
        self.sessions.insert(cid, session);
        Ok(())
    }

    /// True if `cid` is in use.
    pub fn contains(&self, cid: ConnectionId) -> bool {
        self.sessions.contains_key(&cid)
    }

    /// Session by connection id.
    pub fn get(&self, cid: ConnectionId) -> Option<&Session> {
        self.sessions.get(&cid)
    }

    /// Newest session with `peer`, established or not.
    pub fn by_fingerprint(&self, peer: &Fingerprint) -> Option<&Session> {
        self.by_peer.get(peer).and_then(|cid| self.sessions.get(cid))
    }

    /// Connection id of an established session with `peer`.
    pub fn established_for(&self, peer: &Fingerprint) -> Option<ConnectionId> {
        self.by_fingerprint(peer).filter(|s| s.established).map(|s| s.connection_id)
    }

    /// Every connection id belonging to `peer`.
    pub fn connections_for(&self, peer: &Fingerprint) -> Vec<ConnectionId> {
        self.sessions.values().filter(|s| s.peer == *peer).map(|s| s.connection_id).collect()
    }

    /// Remove a session, zeroizing its keys when the returned value drops.
    pub fn remove(&mut self, cid: ConnectionId) -> Option<Session> {
        let session = self.sessions.remove(&cid)?;
        if self.by_peer.get(&session.peer) == Some(&cid) {
            self.by_peer.remove(&session.peer);
            // Fall back to any other session still open with this peer.
            if let Some(other) = self.sessions.values().find(|s| s.peer == session.peer) {
                self.by_peer.insert(session.peer, other.connection_id);
            }
        }
        Some(session)
    }

    /// Remove every session.
    pub fn drain(&mut self) -> Vec<Session> {
        self.by_peer.clear();
        self.sessions.drain().map(|(_, s)| s).collect()
    }

    /// Number of sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True if there are no sessions.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterate over sessions.
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    /// Encrypt `plaintext` into a DATA frame.
    ///
    /// # Errors
    ///
    /// - `UnknownConnection` / `NotEstablished` for an unusable session
    /// - `SequenceExhausted` once every sequence number has been used
    pub fn seal(
        &mut self,
        cid: ConnectionId,
        stream_id: u16,
        plaintext: &[u8],
    ) -> Result<Frame, SessionError> {
        let session = self.sessions.get_mut(&cid).ok_or(SessionError::UnknownConnection(cid))?;
        if !session.established {
            return Err(SessionError::NotEstablished(cid));
        }
        let sequence = session.send_sequence;
        if sequence >= ACK_SEQUENCE {
            return Err(SessionError::SequenceExhausted(cid));
        }

        let ad = SealedData::associated_data(cid, stream_id, sequence);
        let ciphertext = session.keys.seal(sequence, &ad, plaintext)?;
        session.send_sequence += 1;

        let payload = SealedData { sequence, ciphertext: Bytes::from(ciphertext) };
        Ok(Frame::new(FrameType::Data, cid, stream_id, payload.to_bytes()))
    }

    /// Decrypt a DATA frame.
    ///
    /// The receive window only advances on success, so a forged frame cannot
    /// push it forward.
    pub fn open(&mut self, frame: &Frame) -> Result<Opened, SessionError> {
        let cid = frame.connection_id();
        let session = self.sessions.get_mut(&cid).ok_or(SessionError::UnknownConnection(cid))?;
        if !session.established {
            return Err(SessionError::NotEstablished(cid));
        }

        let data = SealedData::decode(&frame.payload)?;
        if data.sequence < session.recv_sequence || data.sequence == ACK_SEQUENCE {
            return Err(SessionError::StaleSequence {
                sequence: data.sequence,
                expected: session.recv_sequence,
            });
        }

        let stream_id = frame.header.stream_id();
        let ad = SealedData::associated_data(cid, stream_id, data.sequence);
        let plaintext = session.keys.open(data.sequence, &ad, &data.ciphertext)?;
        session.recv_sequence = data.sequence + 1;

        Ok(Opened { peer: session.peer, stream_id, sequence: data.sequence, plaintext })
    }

    /// ACK frame confirming a responder session to its initiator.
    pub fn ack_frame(&self, cid: ConnectionId) -> Result<Frame, SessionError> {
        let session = self.sessions.get(&cid).ok_or(SessionError::UnknownConnection(cid))?;
        let tag = session.keys.ack_tag(&cid.to_be_bytes())?;
        Ok(Frame::new(FrameType::Ack, cid, 0, HandshakeAck { tag }.to_bytes()))
    }

    /// Verify the responder's ACK and mark the initiator session
    /// established. Returns the peer.
    pub fn confirm(&mut self, frame: &Frame) -> Result<Fingerprint, SessionError> {
        let cid = frame.connection_id();
        let session = self.sessions.get_mut(&cid).ok_or(SessionError::UnknownConnection(cid))?;
        let ack = HandshakeAck::decode(&frame.payload)?;
        session.keys.verify_ack(&cid.to_be_bytes(), &ack.tag)?;
        session.established = true;
        self.by_peer.insert(session.peer, cid);
        Ok(session.peer)
    }
}

#[cfg(test)]
mod tests {
    use parley_crypto::{StaticKeypair, initiate, respond};

    use super::*;

    struct Pair {
        alice: SessionTable,
        bob: SessionTable,
        cid: ConnectionId,
    }

    fn handshake() -> Pair {
        let a = StaticKeypair::from_secret_bytes([1; 32]);
        let b = StaticKeypair::from_secret_bytes([2; 32]);
        let (msg, init_keys) = initiate(&a, b.public(), [3; 32]).unwrap();
        let (_, resp_keys) = respond(&b, &msg).unwrap();

        let cid = ConnectionId(0xfeed);
        let now = Instant::now();
        let route = Route::Direct("127.0.0.1:1".parse().unwrap());

        let mut alice = SessionTable::new();
        alice
            .insert(Session::new(cid, b.fingerprint(), route, Role::Initiator, init_keys, now))
            .unwrap();
        let mut bob = SessionTable::new();
        bob.insert(Session::new(cid, a.fingerprint(), route, Role::Responder, resp_keys, now))
            .unwrap();

        let ack = bob.ack_frame(cid).unwrap();
        alice.confirm(&ack).unwrap();
        Pair { alice, bob, cid }
    }

    #[test]
    fn initiator_waits_for_ack() {
        let a = StaticKeypair::from_secret_bytes([1; 32]);
        let b = StaticKeypair::from_secret_bytes([2; 32]);
        let (_, keys) = initiate(&a, b.public(), [3; 32]).unwrap();
        let cid = ConnectionId(1);
        let route = Route::Relayed(b.fingerprint());

        let mut table = SessionTable::new();
        table
            .insert(Session::new(cid, b.fingerprint(), route, Role::Initiator, keys, Instant::now()))
            .unwrap();

        assert!(table.established_for(&b.fingerprint()).is_none());
        assert!(matches!(table.seal(cid, 0, b"x"), Err(SessionError::NotEstablished(_))));
    }

    #[test]
    fn forged_ack_is_rejected() {
        let mut pair = handshake();
        let forged = Frame::new(FrameType::Ack, pair.cid, 0, vec![0u8; 16]);
        assert!(matches!(pair.alice.confirm(&forged), Err(SessionError::Crypto(_))));
        // The genuine confirmation still stands.
        assert!(pair.alice.get(pair.cid).unwrap().is_established());
        assert!(pair.bob.get(pair.cid).unwrap().is_established());
    }

    #[test]
    fn in_order_messages_open() {
        let mut pair = handshake();
        for i in 0..5u8 {
            let frame = pair.alice.seal(pair.cid, 1, &[i]).unwrap();
            let opened = pair.bob.open(&frame).unwrap();
            assert_eq!(opened.plaintext, vec![i]);
            assert_eq!(opened.sequence, u64::from(i));
            assert_eq!(opened.stream_id, 1);
        }
        assert_eq!(pair.alice.get(pair.cid).unwrap().send_sequence(), 5);
        assert_eq!(pair.bob.get(pair.cid).unwrap().recv_sequence(), 5);
    }

    #[test]
    fn replay_and_reorder_fail_gaps_succeed() {
        let mut pair = handshake();
        let first = pair.alice.seal(pair.cid, 0, b"one").unwrap();
        let second = pair.alice.seal(pair.cid, 0, b"two").unwrap();
        let third = pair.alice.seal(pair.cid, 0, b"three").unwrap();

        // Gap: `second` is lost in transit.
        pair.bob.open(&first).unwrap();
        assert_eq!(pair.bob.open(&third).unwrap().plaintext, b"three");

        assert!(matches!(pair.bob.open(&second), Err(SessionError::StaleSequence { .. })));
        assert!(matches!(pair.bob.open(&third), Err(SessionError::StaleSequence { .. })));
    }

    #[test]
    fn tampered_frame_does_not_advance_window() {
        let mut pair = handshake();
        let frame = pair.alice.seal(pair.cid, 0, b"hello").unwrap();

        let mut payload = frame.payload.to_vec();
        let last = payload.len() - 1;
        payload[last] ^= 1;
        let tampered = Frame::new(FrameType::Data, pair.cid, 0, payload);
        assert!(matches!(pair.bob.open(&tampered), Err(SessionError::Crypto(_))));

        assert_eq!(pair.bob.open(&frame).unwrap().plaintext, b"hello");
    }

    #[test]
    fn stream_id_is_authenticated() {
        let mut pair = handshake();
        let frame = pair.alice.seal(pair.cid, 7, b"hello").unwrap();
        let moved = Frame::new(FrameType::Data, pair.cid, 8, frame.payload.clone());
        assert!(pair.bob.open(&moved).is_err());
    }

    #[test]
    fn duplicate_connection_id_is_rejected() {
        let mut pair = handshake();
        let b = StaticKeypair::from_secret_bytes([2; 32]);
        let a = StaticKeypair::from_secret_bytes([1; 32]);
        let (_, keys) = initiate(&a, b.public(), [9; 32]).unwrap();
        let session = Session::new(
            pair.cid,
            b.fingerprint(),
            Route::Relayed(b.fingerprint()),
            Role::Initiator,
            keys,
            Instant::now(),
        );
        assert!(matches!(pair.alice.insert(session), Err(SessionError::DuplicateConnection(_))));
    }

    #[test]
    fn removed_session_drops_frames() {
        let mut pair = handshake();
        let frame = pair.alice.seal(pair.cid, 0, b"late").unwrap();
        let removed = pair.bob.remove(pair.cid).unwrap();
        assert_eq!(removed.connection_id(), pair.cid);

        assert!(matches!(pair.bob.open(&frame), Err(SessionError::UnknownConnection(_))));
        assert!(pair.bob.is_empty());
    }

    #[test]
    fn drain_empties_table() {
        let mut pair = handshake();
        assert_eq!(pair.alice.drain().len(), 1);
        assert!(pair.alice.is_empty());
        assert!(pair.alice.by_fingerprint(&StaticKeypair::from_secret_bytes([2; 32]).fingerprint()).is_none());
    }
}
