//! Parley rendezvous relay.
//!
//! Clients behind NAT register their fingerprint with the relay, fetch the
//! list of other registered clients, and send each other frames wrapped in
//! RELAY commands. The relay never decrypts anything; it only maps
//! fingerprints to the address they last registered from.
//!
//! ## Architecture
//!
//! ```text
//! parley-relay
//!   ├─ RelayServer     (async driver: socket loop, worker tasks, sweep task)
//!   └─ RelayRegistry   (sans-IO state: registrations → actions)
//! ```
//!
//! Every datagram is handled in its own task, bounded by a semaphore. The
//! registry sits behind a single mutex; replies are sent after it is
//! released.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod registry;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::Bytes;
pub use error::RelayError;
use parley_core::{DatagramSocket, Environment, SystemEnv};
use parley_proto::{MAX_DATAGRAM_SIZE, RelayRequest};
pub use registry::{Registration, RelayAction, RelayRegistry, RelayStats};
use tokio::sync::{Mutex, Semaphore};

/// Default UDP port.
pub const DEFAULT_PORT: u16 = 7777;

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address to bind to
    pub bind_address: String,
    /// How often idle registrations are swept
    pub sweep_interval: Duration,
    /// Idle time after which a registration is evicted
    pub inactivity_timeout: Duration,
    /// Most registrations held at once
    pub max_registrations: usize,
    /// Most datagrams handled concurrently
    pub max_in_flight: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_address: format!("0.0.0.0:{DEFAULT_PORT}"),
            sweep_interval: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(60),
            max_registrations: 10_000,
            max_in_flight: 1024,
        }
    }
}

/// Relay server over any [`DatagramSocket`].
pub struct RelayServer<S, E> {
    socket: Arc<S>,
    registry: Arc<Mutex<RelayRegistry>>,
    env: E,
    config: RelayConfig,
}

impl RelayServer<tokio::net::UdpSocket, SystemEnv> {
    /// Bind a UDP socket and create a production relay.
    ///
    /// # Errors
    ///
    /// Returns error if binding to the address fails.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let socket = tokio::net::UdpSocket::bind(&config.bind_address).await?;
        Ok(Self::new(socket, SystemEnv::new(), config))
    }
}

impl<S: DatagramSocket, E: Environment> RelayServer<S, E> {
    /// Relay over an already-bound socket.
    pub fn new(socket: S, env: E, config: RelayConfig) -> Self {
        let registry = RelayRegistry::new(config.max_registrations);
        Self { socket: Arc::new(socket), registry: Arc::new(Mutex::new(registry)), env, config }
    }

    /// Address the relay is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared handle to the registry, for inspection.
    pub fn registry(&self) -> Arc<Mutex<RelayRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Run until the task is cancelled.
    pub async fn run(self) -> Result<(), RelayError> {
        if self.config.max_in_flight == 0 {
            return Err(RelayError::Config("max_in_flight must be at least 1".to_string()));
        }

        tracing::info!("Relay listening on {}", self.socket.local_addr()?);

        let sweeper = tokio::spawn(sweep_loop(
            Arc::clone(&self.registry),
            self.env.clone(),
            self.config.sweep_interval,
            self.config.inactivity_timeout,
        ));

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        let result = loop {
            let (len, from) = match self.socket.recv_from(&mut buf).await {
                Ok(received) => received,
                Err(e) => {
                    tracing::warn!("Receive error: {}", e);
                    continue;
                },
            };

            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => break Err(RelayError::Internal(e.to_string())),
            };

            let datagram = Bytes::copy_from_slice(&buf[..len]);
            let socket = Arc::clone(&self.socket);
            let registry = Arc::clone(&self.registry);
            let now = self.env.now();

            tokio::spawn(async move {
                handle_datagram(&*socket, &registry, datagram, from, now).await;
                drop(permit);
            });
        };

        sweeper.abort();
        result
    }
}

async fn sweep_loop<E: Environment>(
    registry: Arc<Mutex<RelayRegistry>>,
    env: E,
    interval: Duration,
    timeout: Duration,
) {
    loop {
        env.sleep(interval).await;
        let (evicted, stats) = {
            let mut guard = registry.lock().await;
            (guard.sweep(env.now(), timeout), guard.stats())
        };
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "sweep evicted registrations");
        }
        tracing::info!(
            clients = stats.registrations,
            packets = stats.packets_relayed,
            bytes = stats.bytes_relayed,
            "relay stats"
        );
    }
}

/// Decode, update the registry, then send outside the lock.
async fn handle_datagram<S: DatagramSocket>(
    socket: &S,
    registry: &Mutex<RelayRegistry>,
    datagram: Bytes,
    from: SocketAddr,
    now: std::time::Instant,
) {
    let request = match RelayRequest::decode(&datagram) {
        Ok(request) => request,
        Err(e) => {
            tracing::debug!(%from, "dropping malformed datagram: {}", e);
            return;
        },
    };

    let actions = registry.lock().await.handle(request, from, now);

    for action in actions {
        let (to, bytes) = match action {
            RelayAction::Reply { to, response } => match response.encode() {
                Ok(bytes) => (to, bytes),
                Err(e) => {
                    tracing::error!("Failed to encode response: {}", e);
                    continue;
                },
            },
            RelayAction::Forward { to, payload } => (to, payload),
        };

        if let Err(e) = socket.send_to(&bytes, to).await {
            tracing::debug!(%to, "send failed: {}", e);
        }
    }
}
