//! Client configuration.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Default client UDP port.
pub const DEFAULT_PORT: u16 = 4443;

/// Protocol timing and identity settings for the [`Messenger`](crate::Messenger).
#[derive(Debug, Clone)]
pub struct MessengerConfig {
    /// Name announced to the relay.
    pub display_name: String,
    /// Relay address, if any.
    pub relay: Option<SocketAddr>,
    /// Delay between a session coming up and its queue being flushed, so the
    /// peer has finished its own setup.
    pub flush_settle_delay: Duration,
    /// How long an unanswered handshake blocks a new attempt on the same
    /// route.
    pub handshake_timeout: Duration,
    /// Interval between relay REGISTER / PEER_LIST_REQUEST rounds.
    pub heartbeat_interval: Duration,
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            display_name: "parley".to_string(),
            relay: None,
            flush_settle_delay: Duration::from_millis(500),
            handshake_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(10),
        }
    }
}

/// Runtime settings for the [`ClientRuntime`](crate::ClientRuntime).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Address to bind the UDP socket to.
    pub bind_address: String,
    /// Directory for identity, contacts and queue.
    pub data_dir: PathBuf,
    /// How often the messenger gets a `Tick`.
    pub tick_interval: Duration,
    /// Upper bound on sending GOODBYEs at shutdown.
    pub shutdown_timeout: Duration,
    /// Protocol settings.
    pub messenger: MessengerConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            data_dir: PathBuf::from("parley-data"),
            tick_interval: Duration::from_millis(100),
            shutdown_timeout: Duration::from_secs(2),
            messenger: MessengerConfig::default(),
        }
    }
}
