//! Relay request/response codec.
//!
//! Clients talk to the relay with one command per datagram. The first byte
//! selects the command; requests use the low range and responses have the
//! high bit set, which lets a client tell a relay response apart from a frame
//! the relay forwarded on someone else's behalf.
//!
//! ```text
//! 0x01 REGISTER           fp(16) ‖ name_len(1) ‖ name ‖ key_len(1) ‖ key
//! 0x02 RELAY              dest_fp(16) ‖ payload
//! 0x03 PEER_LIST_REQUEST  requester_fp(16)
//! 0x81 REGISTER_ACK       fp(16)
//! 0x82 PEER_LIST          count(1) ‖ { fp(16) ‖ name_len ‖ name ‖ key_len ‖ key }*
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    FINGERPRINT_LEN, Fingerprint, MAX_DATAGRAM_SIZE,
    errors::{ProtocolError, Result},
};

const CMD_REGISTER: u8 = 0x01;
const CMD_RELAY: u8 = 0x02;
const CMD_PEER_LIST_REQUEST: u8 = 0x03;
const CMD_REGISTER_ACK: u8 = 0x81;
const CMD_PEER_LIST: u8 = 0x82;

/// Most entries a single PEER_LIST can carry.
pub const MAX_PEER_LIST_ENTRIES: usize = u8::MAX as usize;

/// Longest length-prefixed field.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// Static key length a REGISTER must carry to be accepted.
pub const REGISTER_KEY_LEN: usize = 32;

/// Room for PEER_LIST entries after the command and count bytes.
const PEER_LIST_BUDGET: usize = MAX_DATAGRAM_SIZE - 2;

/// Datagram sent by a client to the relay.
#[derive(Clone, PartialEq, Eq)]
pub enum RelayRequest {
    /// Announce (or refresh) this client's address under its fingerprint.
    Register {
        /// Sender's fingerprint.
        fingerprint: Fingerprint,
        /// Display name shown to other clients.
        name: String,
        /// Sender's static public key.
        public_key: Vec<u8>,
    },
    /// Forward `payload` to the client registered as `destination`.
    Relay {
        /// Recipient's fingerprint.
        destination: Fingerprint,
        /// Opaque frame bytes, forwarded verbatim.
        payload: Bytes,
    },
    /// Ask for the current registrations, excluding the requester.
    PeerListRequest {
        /// Requester's fingerprint.
        requester: Fingerprint,
    },
}

impl RelayRequest {
    /// Build a REGISTER, truncating an over-long name at a character boundary.
    pub fn register(fingerprint: Fingerprint, name: &str, public_key: Vec<u8>) -> Self {
        Self::Register { fingerprint, name: truncate_name(name).to_owned(), public_key }
    }

    /// Encode to a datagram.
    pub fn encode(&self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        match self {
            Self::Register { fingerprint, name, public_key } => {
                out.put_u8(CMD_REGISTER);
                out.put_slice(fingerprint.as_bytes());
                put_field(&mut out, "name", truncate_name(name).as_bytes())?;
                put_field(&mut out, "public_key", public_key)?;
            },
            Self::Relay { destination, payload } => {
                if payload.is_empty() {
                    return Err(ProtocolError::EmptyRelayPayload);
                }
                out.reserve(1 + FINGERPRINT_LEN + payload.len());
                out.put_u8(CMD_RELAY);
                out.put_slice(destination.as_bytes());
                out.put_slice(payload);
            },
            Self::PeerListRequest { requester } => {
                out.put_u8(CMD_PEER_LIST_REQUEST);
                out.put_slice(requester.as_bytes());
            },
        }
        Ok(out.freeze())
    }

    /// Decode a datagram received by the relay.
    pub fn decode(datagram: &Bytes) -> Result<Self> {
        let (&command, _) = datagram.split_first().ok_or(ProtocolError::Empty)?;
        let mut reader = Reader::new(&datagram[1..]);

        let request = match command {
            CMD_REGISTER => {
                let fingerprint = reader.fingerprint("fingerprint")?;
                let name = String::from_utf8_lossy(reader.field("name")?).into_owned();
                let public_key = reader.field("public_key")?.to_vec();
                Self::Register { fingerprint, name, public_key }
            },
            CMD_RELAY => {
                let destination = reader.fingerprint("destination")?;
                let payload = datagram.slice(1 + FINGERPRINT_LEN..);
                if payload.is_empty() {
                    return Err(ProtocolError::EmptyRelayPayload);
                }
                return Ok(Self::Relay { destination, payload });
            },
            CMD_PEER_LIST_REQUEST => {
                Self::PeerListRequest { requester: reader.fingerprint("requester")? }
            },
            other => return Err(ProtocolError::UnknownRelayCommand(other)),
        };

        reader.finish()?;
        Ok(request)
    }
}

impl std::fmt::Debug for RelayRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Register { fingerprint, name, public_key } => f
                .debug_struct("Register")
                .field("fingerprint", fingerprint)
                .field("name", name)
                .field("public_key", &format!("<{} bytes>", public_key.len()))
                .finish(),
            Self::Relay { destination, payload } => f
                .debug_struct("Relay")
                .field("destination", destination)
                .field("payload", &format!("<{} bytes>", payload.len()))
                .finish(),
            Self::PeerListRequest { requester } => {
                f.debug_struct("PeerListRequest").field("requester", requester).finish()
            },
        }
    }
}

/// One registration as advertised in a PEER_LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    /// Registered fingerprint.
    pub fingerprint: Fingerprint,
    /// Registered display name.
    pub name: String,
    /// Registered static public key, as supplied by the client.
    pub public_key: Vec<u8>,
}

impl PeerEntry {
    /// Bytes this entry takes up in an encoded PEER_LIST.
    pub fn encoded_len(&self) -> usize {
        FINGERPRINT_LEN + 1 + truncate_name(&self.name).len() + 1 + self.public_key.len()
    }
}

/// How many leading `entries` fit in one PEER_LIST datagram.
pub fn peer_list_fit(entries: &[PeerEntry]) -> usize {
    let mut used = 0;
    entries
        .iter()
        .take(MAX_PEER_LIST_ENTRIES)
        .take_while(|entry| {
            used += entry.encoded_len();
            used <= PEER_LIST_BUDGET
        })
        .count()
}

/// Datagram sent by the relay to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayResponse {
    /// Registration accepted.
    RegisterAck {
        /// Echo of the registered fingerprint.
        fingerprint: Fingerprint,
    },
    /// Current registrations, at most [`MAX_PEER_LIST_ENTRIES`].
    PeerList(Vec<PeerEntry>),
}

impl RelayResponse {
    /// True if `datagram` starts with a relay response command byte.
    ///
    /// Frames start with a big-endian length whose first byte is zero for any
    /// datagram-sized frame, so the two never collide.
    pub fn is_response(datagram: &[u8]) -> bool {
        matches!(datagram.first(), Some(&(CMD_REGISTER_ACK | CMD_PEER_LIST)))
    }

    /// Encode to a datagram. Entries past the count cap or the datagram size
    /// are dropped.
    pub fn encode(&self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        match self {
            Self::RegisterAck { fingerprint } => {
                out.put_u8(CMD_REGISTER_ACK);
                out.put_slice(fingerprint.as_bytes());
            },
            Self::PeerList(entries) => {
                let entries = &entries[..peer_list_fit(entries)];
                out.put_u8(CMD_PEER_LIST);
                out.put_u8(u8::try_from(entries.len()).unwrap_or(u8::MAX));
                for entry in entries {
                    out.put_slice(entry.fingerprint.as_bytes());
                    put_field(&mut out, "name", truncate_name(&entry.name).as_bytes())?;
                    put_field(&mut out, "public_key", &entry.public_key)?;
                }
            },
        }
        Ok(out.freeze())
    }

    /// Decode a datagram received from the relay.
    pub fn decode(datagram: &[u8]) -> Result<Self> {
        let (&command, rest) = datagram.split_first().ok_or(ProtocolError::Empty)?;
        let mut reader = Reader::new(rest);

        let response = match command {
            CMD_REGISTER_ACK => Self::RegisterAck { fingerprint: reader.fingerprint("fingerprint")? },
            CMD_PEER_LIST => {
                let count = reader.u8("count")?;
                let mut entries = Vec::with_capacity(usize::from(count));
                for _ in 0..count {
                    let fingerprint = reader.fingerprint("entry fingerprint")?;
                    let name = String::from_utf8_lossy(reader.field("entry name")?).into_owned();
                    let public_key = reader.field("entry public_key")?.to_vec();
                    entries.push(PeerEntry { fingerprint, name, public_key });
                }
                Self::PeerList(entries)
            },
            other => return Err(ProtocolError::UnknownRelayCommand(other)),
        };

        reader.finish()?;
        Ok(response)
    }
}

/// Longest prefix of `name` that fits a one-byte length and ends on a char
/// boundary.
fn truncate_name(name: &str) -> &str {
    if name.len() <= MAX_FIELD_LEN {
        return name;
    }
    let mut end = MAX_FIELD_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn put_field(out: &mut BytesMut, field: &'static str, value: &[u8]) -> Result<()> {
    let len = u8::try_from(value.len())
        .map_err(|_| ProtocolError::FieldTooLong { field, len: value.len() })?;
    out.put_u8(len);
    out.put_slice(value);
    Ok(())
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(ProtocolError::TruncatedRelayMessage(what));
        }
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self, what: &'static str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn fingerprint(&mut self, what: &'static str) -> Result<Fingerprint> {
        Fingerprint::from_slice(self.take(FINGERPRINT_LEN, what)?)
    }

    fn field(&mut self, what: &'static str) -> Result<&'a [u8]> {
        let len = self.u8(what)?;
        self.take(usize::from(len), what)
    }

    fn finish(self) -> Result<()> {
        if self.buf.is_empty() { Ok(()) } else { Err(ProtocolError::TrailingRelayBytes(self.buf.len())) }
    }
}
