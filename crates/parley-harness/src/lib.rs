//! Deterministic simulation harness for Parley.
//!
//! Two ways to run the protocol without real sockets or real time:
//!
//! - [`Network`]: messengers wired to each other in memory. Datagrams are
//!   delivered in order, one at a time, and the clock only moves when a test
//!   says so. Best for protocol scenarios (handshake races, offline queues,
//!   key pinning).
//! - [`SimSocket`] under turmoil: the real [`ClientRuntime`] and
//!   [`RelayServer`] on simulated hosts, for end-to-end runs through the
//!   async drivers.
//!
//! Both use [`SimEnv`], whose RNG is seeded so every key and connection id is
//! reproducible.
//!
//! [`ClientRuntime`]: parley_client::ClientRuntime
//! [`RelayServer`]: parley_relay::RelayServer

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod network;
mod sim_env;
mod sim_socket;

pub use network::{Network, NodeId};
pub use sim_env::SimEnv;
pub use sim_socket::SimSocket;
