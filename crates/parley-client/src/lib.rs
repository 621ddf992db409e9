//! Parley messaging client.
//!
//! ## Architecture
//!
//! ```text
//! parley-client
//!   ├─ ClientRuntime   (async driver: socket, command channel, ticker)
//!   └─ Messenger       (sans-IO: events → actions)
//!        ├─ SessionTable, PeerDirectory
//!        └─ ContactBook, MessageQueue (persisted)
//! ```
//!
//! The [`Messenger`] decides; the [`ClientRuntime`] executes. Tests drive the
//! messenger directly and check the actions it returns, without sockets or
//! timers.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod event;
mod messenger;
mod runtime;

pub use config::{ClientConfig, DEFAULT_PORT, MessengerConfig};
pub use error::ClientError;
pub use event::{MessengerAction, MessengerEvent, PeerSummary};
pub use messenger::{MAX_MESSAGE_SIZE, Messenger};
pub use runtime::{ClientHandle, ClientRuntime};
