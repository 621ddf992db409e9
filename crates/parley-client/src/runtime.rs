//! Async driver for the [`Messenger`].
//!
//! One task owns the socket and the messenger. Datagrams, user commands and
//! timer ticks are multiplexed in a single `select!` loop, so the messenger
//! sees one event at a time and every send goes out from the same place.

use std::net::SocketAddr;

use bytes::Bytes;
use parley_core::{DatagramSocket, Environment, QueueEntry};
use parley_crypto::PublicKey;
use parley_proto::{Fingerprint, MAX_DATAGRAM_SIZE};
use tokio::{
    sync::{mpsc, oneshot},
    time::MissedTickBehavior,
};

use crate::{
    config::ClientConfig,
    error::ClientError,
    event::{MessengerAction, MessengerEvent, PeerSummary},
    messenger::Messenger,
};

/// Depth of the command and notification channels.
const CHANNEL_CAPACITY: usize = 256;

type Reply = oneshot::Sender<Result<(), ClientError>>;

/// Requests from a [`ClientHandle`] to the runtime.
#[derive(Debug)]
enum Command {
    Send { to: String, text: String, reply: Reply },
    Connect { to: String, reply: Reply },
    Discovered { name: String, addr: SocketAddr, public_key: PublicKey },
    Lost { fingerprint: Fingerprint },
    Peers { reply: oneshot::Sender<Vec<PeerSummary>> },
    Shutdown,
}

/// Cloneable handle for talking to a running [`ClientRuntime`].
#[derive(Debug, Clone)]
pub struct ClientHandle {
    commands: mpsc::Sender<Command>,
}

impl ClientHandle {
    /// Send `text` to a peer by name or fingerprint. Queues it if no session
    /// is up.
    ///
    /// # Errors
    ///
    /// `UnknownPeer`, `MessageTooLarge`, or `Stopped` if the runtime is gone.
    pub async fn send_message(&self, to: &str, text: &str) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Send { to: to.to_owned(), text: text.to_owned(), reply }).await?;
        rx.await.map_err(|_| ClientError::Stopped)?
    }

    /// Start a handshake with a known peer.
    ///
    /// # Errors
    ///
    /// `UnknownPeer`, `NoRoute`, or `Stopped`.
    pub async fn connect(&self, to: &str) -> Result<(), ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Connect { to: to.to_owned(), reply }).await?;
        rx.await.map_err(|_| ClientError::Stopped)?
    }

    /// Feed a discovery announcement from outside (LAN discovery, manual
    /// entry).
    ///
    /// # Errors
    ///
    /// `Stopped` if the runtime is gone.
    pub async fn peer_discovered(
        &self,
        name: &str,
        addr: SocketAddr,
        public_key: PublicKey,
    ) -> Result<(), ClientError> {
        self.request(Command::Discovered { name: name.to_owned(), addr, public_key }).await
    }

    /// Report a peer gone; its sessions are closed and its messages stay
    /// queued.
    ///
    /// # Errors
    ///
    /// `Stopped` if the runtime is gone.
    pub async fn peer_lost(&self, fingerprint: Fingerprint) -> Result<(), ClientError> {
        self.request(Command::Lost { fingerprint }).await
    }

    /// Current peers.
    ///
    /// # Errors
    ///
    /// `Stopped` if the runtime is gone.
    pub async fn peers(&self) -> Result<Vec<PeerSummary>, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.request(Command::Peers { reply }).await?;
        rx.await.map_err(|_| ClientError::Stopped)
    }

    /// Ask the runtime to say GOODBYE to everyone and stop.
    ///
    /// # Errors
    ///
    /// `Stopped` if the runtime is already gone.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.request(Command::Shutdown).await
    }

    async fn request(&self, command: Command) -> Result<(), ClientError> {
        self.commands.send(command).await.map_err(|_| ClientError::Stopped)
    }
}

/// Event loop executing [`Messenger`] actions against a socket.
///
/// # Type Parameters
///
/// - `S`: datagram socket (tokio UDP in production, turmoil in tests)
/// - `E`: Environment implementation for time/randomness
pub struct ClientRuntime<S: DatagramSocket, E: Environment> {
    socket: S,
    messenger: Messenger<E>,
    config: ClientConfig,
    commands: mpsc::Receiver<Command>,
    notifications: mpsc::Sender<MessengerAction>,
}

impl<S: DatagramSocket, E: Environment> ClientRuntime<S, E> {
    /// Wrap a bound socket and a messenger.
    ///
    /// Returns the runtime, a handle for commands, and the stream of
    /// user-facing actions (everything except `Transmit`).
    pub fn new(
        socket: S,
        messenger: Messenger<E>,
        config: ClientConfig,
    ) -> (Self, ClientHandle, mpsc::Receiver<MessengerAction>) {
        let (command_tx, command_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (notify_tx, notify_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let runtime = Self {
            socket,
            messenger,
            config,
            commands: command_rx,
            notifications: notify_tx,
        };
        (runtime, ClientHandle { commands: command_tx }, notify_rx)
    }

    /// Local socket address.
    ///
    /// # Errors
    ///
    /// Returns the socket's error.
    pub fn local_addr(&self) -> Result<SocketAddr, ClientError> {
        Ok(self.socket.local_addr()?)
    }

    /// Run until a shutdown command arrives or every handle is dropped.
    ///
    /// # Errors
    ///
    /// Currently infallible after startup; socket receive errors are logged
    /// and the loop continues.
    pub async fn run(mut self) -> Result<(), ClientError> {
        tracing::info!(
            fingerprint = %self.messenger.fingerprint(),
            addr = ?self.socket.local_addr().ok(),
            "client running"
        );

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok((len, from)) => {
                        let datagram = Bytes::copy_from_slice(&buf[..len]);
                        self.dispatch(MessengerEvent::DatagramReceived { from, datagram }).await;
                    },
                    Err(e) => tracing::warn!(error = %e, "receive failed"),
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                _ = ticker.tick() => self.dispatch(MessengerEvent::Tick).await,
            }
        }

        self.shutdown().await;
        Ok(())
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Send { to, text, reply } => {
                let result = self.request(MessengerEvent::SendMessage { to, text }).await;
                let _ = reply.send(result);
            },
            Command::Connect { to, reply } => {
                let result = self.request(MessengerEvent::Connect { to }).await;
                let _ = reply.send(result);
            },
            Command::Discovered { name, addr, public_key } => {
                self.dispatch(MessengerEvent::PeerDiscovered { name, addr, public_key }).await;
            },
            Command::Lost { fingerprint } => {
                self.dispatch(MessengerEvent::PeerLost { fingerprint }).await;
            },
            Command::Peers { reply } => {
                let _ = reply.send(self.messenger.peer_summaries());
            },
            Command::Shutdown => {},
        }
    }

    /// Run a user request, executing its actions and returning its error.
    async fn request(&mut self, event: MessengerEvent) -> Result<(), ClientError> {
        let actions = self.messenger.handle(event)?;
        self.execute(actions).await;
        Ok(())
    }

    /// Run a network or timer event; errors are logged, never surfaced.
    async fn dispatch(&mut self, event: MessengerEvent) {
        match self.messenger.handle(event) {
            Ok(actions) => self.execute(actions).await,
            Err(e) if e.is_droppable() => tracing::debug!(error = %e, "dropped datagram"),
            Err(e) => tracing::warn!(error = %e, "event failed"),
        }
    }

    /// Perform actions. Entries whose datagram could not be sent go back to
    /// the messenger so they are requeued.
    async fn execute(&mut self, actions: Vec<MessengerAction>) {
        let mut pending = actions;
        while !pending.is_empty() {
            let failed = self.perform(pending).await;
            if failed.is_empty() {
                break;
            }
            pending = match self.messenger.handle(MessengerEvent::TransmitFailed { entries: failed })
            {
                Ok(actions) => actions,
                Err(e) => {
                    tracing::warn!(error = %e, "requeue failed");
                    break;
                },
            };
        }
    }

    async fn perform(&mut self, actions: Vec<MessengerAction>) -> Vec<QueueEntry> {
        let mut failed = Vec::new();
        for action in actions {
            match action {
                MessengerAction::Transmit { to, datagram, requeue } => {
                    if let Err(e) = self.socket.send_to(&datagram, to).await {
                        tracing::warn!(to = %to, error = %e, "send failed");
                        failed.extend(requeue);
                    }
                },
                notification => {
                    if self.notifications.send(notification).await.is_err() {
                        tracing::trace!("no listener for notifications");
                    }
                },
            }
        }
        failed
    }

    /// Send GOODBYE on every session, bounded by the shutdown timeout.
    async fn shutdown(&mut self) {
        let actions = match self.messenger.handle(MessengerEvent::Shutdown) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(error = %e, "shutdown failed");
                return;
            },
        };
        if tokio::time::timeout(self.config.shutdown_timeout, self.perform(actions)).await.is_err()
        {
            tracing::warn!("goodbyes timed out");
        }
        tracing::info!("client stopped");
    }
}
