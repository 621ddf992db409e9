//! Parley core protocol state.
//!
//! Everything a client needs to track between datagrams, with no I/O of its
//! own beyond small JSON files:
//!
//! - [`SessionTable`]: connection id → [`Session`], sealing and opening DATA
//! - [`ContactBook`]: trust-on-first-use key pinning
//! - [`MessageQueue`]: durable per-peer outbox
//! - [`PeerDirectory`]: who is reachable and how
//! - [`Identity`]: the local static keypair
//!
//! The [`Environment`] and [`DatagramSocket`] traits are the seams where a
//! driver plugs in real or simulated time, randomness and networking.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod contacts;
pub mod env;
pub mod error;
pub mod identity;
pub mod peer;
pub mod queue;
pub mod session;
pub mod store;
mod system_env;
pub mod transport;

pub use contacts::{Contact, ContactBook, TrustDecision, placeholder_name};
pub use env::Environment;
pub use error::{IdentityError, SessionError, StorageError};
pub use identity::Identity;
pub use peer::{DiscoveryOutcome, Peer, PeerDirectory, PeerState, Route};
pub use queue::{MessageQueue, QueueEntry};
pub use session::{Opened, Session, SessionTable};
pub use system_env::SystemEnv;
pub use transport::DatagramSocket;
