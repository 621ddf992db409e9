//! Parley client binary.
//!
//! # Usage
//!
//! ```bash
//! # Direct peers only
//! parley --name alice --port 4443
//!
//! # Through a relay
//! parley --name alice --relay relay.example.net:7777 --data-dir ~/.parley
//! ```
//!
//! Commands on stdin:
//!
//! ```text
//! add <name> <ip:port> <public-key-hex>
//! send <peer> <text...>
//! connect <peer>
//! offline <fingerprint>
//! peers
//! whoami
//! quit
//! ```

use std::{
    fmt::Display,
    io::{self, Write},
    net::SocketAddr,
    path::PathBuf,
};

use clap::Parser;
use parley_client::{
    ClientConfig, ClientHandle, ClientRuntime, DEFAULT_PORT, Messenger, MessengerAction,
    MessengerConfig,
};
use parley_core::{ContactBook, Identity, MessageQueue, SystemEnv};
use parley_crypto::PublicKey;
use parley_proto::Fingerprint;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    net::UdpSocket,
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley secure messenger
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Peer-to-peer encrypted messaging over UDP")]
#[command(version)]
struct Args {
    /// UDP port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Relay address (host:port)
    #[arg(short, long)]
    relay: Option<String>,

    /// Directory for identity, contacts and queued messages
    #[arg(short, long, default_value = "parley-data")]
    data_dir: PathBuf,

    /// Display name announced to the relay
    #[arg(short, long, default_value = "parley")]
    name: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// One line of user input.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Add { name: String, addr: SocketAddr, public_key: PublicKey },
    Send { to: String, text: String },
    Connect { to: String },
    Offline { fingerprint: Fingerprint },
    Peers,
    WhoAmI,
    Quit,
    Help,
    Invalid(String),
}

impl Input {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        let input = match command {
            "" => return None,
            "add" => {
                let mut parts = rest.split_whitespace();
                let (Some(name), Some(addr), Some(key), None) =
                    (parts.next(), parts.next(), parts.next(), parts.next())
                else {
                    return Some(Self::Invalid("usage: add <name> <ip:port> <public-key-hex>".into()));
                };
                let Ok(addr) = addr.parse() else {
                    return Some(Self::Invalid(format!("bad address: {addr}")));
                };
                let Ok(public_key) = PublicKey::from_hex(key) else {
                    return Some(Self::Invalid("bad public key".into()));
                };
                Self::Add { name: name.to_owned(), addr, public_key }
            },
            "send" => match rest.split_once(char::is_whitespace) {
                Some((to, text)) if !text.trim().is_empty() => {
                    Self::Send { to: to.to_owned(), text: text.trim().to_owned() }
                },
                _ => Self::Invalid("usage: send <peer> <text>".into()),
            },
            "connect" if !rest.is_empty() => Self::Connect { to: rest.to_owned() },
            "connect" => Self::Invalid("usage: connect <peer>".into()),
            "offline" => match Fingerprint::parse(rest) {
                Ok(fingerprint) => Self::Offline { fingerprint },
                Err(_) => Self::Invalid("usage: offline <fingerprint>".into()),
            },
            "peers" => Self::Peers,
            "whoami" => Self::WhoAmI,
            "quit" | "exit" => Self::Quit,
            "help" => Self::Help,
            other => Self::Invalid(format!("unknown command: {other} (try help)")),
        };
        Some(input)
    }
}

fn say(line: impl Display) {
    let _ = writeln!(io::stdout().lock(), "{line}");
}

fn render(action: &MessengerAction) -> Option<String> {
    match action {
        MessengerAction::Deliver { name, text, .. } => Some(format!("<{name}> {text}")),
        MessengerAction::SessionEstablished { fingerprint, name } => {
            Some(format!("* secure session with {name} ({fingerprint})"))
        },
        MessengerAction::SessionClosed { fingerprint, reason } => {
            Some(format!("* session with {fingerprint} closed: {reason}"))
        },
        MessengerAction::Queued { to, pending } => {
            Some(format!("* {pending} message(s) queued for {to}"))
        },
        MessengerAction::TrustWarning { fingerprint, message } => {
            Some(format!("! WARNING {fingerprint}: {message}"))
        },
        MessengerAction::PeersUpdated { count } => Some(format!("* {count} peer(s) known")),
        MessengerAction::Transmit { .. } => None,
    }
}

async fn execute(handle: &ClientHandle, input: Input, whoami: &str) -> bool {
    match input {
        Input::Add { name, addr, public_key } => {
            if let Err(e) = handle.peer_discovered(&name, addr, public_key).await {
                say(format!("error: {e}"));
            }
        },
        Input::Send { to, text } => {
            if let Err(e) = handle.send_message(&to, &text).await {
                say(format!("error: {e}"));
            }
        },
        Input::Connect { to } => {
            if let Err(e) = handle.connect(&to).await {
                say(format!("error: {e}"));
            }
        },
        Input::Offline { fingerprint } => {
            if let Err(e) = handle.peer_lost(fingerprint).await {
                say(format!("error: {e}"));
            }
        },
        Input::Peers => match handle.peers().await {
            Ok(peers) if peers.is_empty() => say("no peers"),
            Ok(peers) => {
                for peer in peers {
                    let status = if peer.connected { "connected" } else { "idle" };
                    say(format!(
                        "{:<16} {} {:<24} {status} ({} queued)",
                        peer.name, peer.fingerprint, peer.route, peer.pending
                    ));
                }
            },
            Err(e) => say(format!("error: {e}")),
        },
        Input::WhoAmI => say(whoami),
        Input::Help => say(
            "add <name> <ip:port> <key> | send <peer> <text> | connect <peer> | offline <fingerprint> \
             | peers | whoami | quit",
        ),
        Input::Invalid(message) => say(message),
        Input::Quit => return false,
    }
    true
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer().with_writer(io::stderr)).with(filter).init();

    tracing::info!("Parley client starting");

    let relay = match &args.relay {
        Some(host) => {
            let addr = tokio::net::lookup_host(host.as_str())
                .await?
                .next()
                .ok_or_else(|| format!("relay address {host} did not resolve"))?;
            Some(addr)
        },
        None => None,
    };

    let env = SystemEnv::new();
    let identity = Identity::load_or_create(&args.data_dir, &env)?;
    let contacts = ContactBook::open(&args.data_dir);
    let queue = MessageQueue::open(&args.data_dir);
    let whoami = format!(
        "{} {} {}",
        args.name,
        identity.fingerprint(),
        identity.public_key().to_hex()
    );

    let config = ClientConfig {
        bind_address: format!("0.0.0.0:{}", args.port),
        data_dir: args.data_dir.clone(),
        messenger: MessengerConfig { display_name: args.name, relay, ..Default::default() },
        ..Default::default()
    };

    let socket = UdpSocket::bind(&config.bind_address).await?;
    tracing::info!("Listening on {}", socket.local_addr()?);

    let messenger = Messenger::new(env, identity, contacts, queue, config.messenger.clone());
    let (runtime, handle, mut notifications) = ClientRuntime::new(socket, messenger, config);
    let runtime = tokio::spawn(runtime.run());

    tokio::spawn(async move {
        while let Some(action) = notifications.recv().await {
            if let Some(line) = render(&action) {
                say(line);
            }
        }
    });

    say(format!("you are {whoami}"));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(input) = Input::parse(&line) else { continue };
                if !execute(&handle, input, &whoami).await {
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.shutdown().await?;
    runtime.await??;

    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_spaces() {
        assert_eq!(
            Input::parse("send bob hello there  "),
            Some(Input::Send { to: "bob".into(), text: "hello there".into() })
        );
    }

    #[test]
    fn blank_lines_are_ignored() {
        assert_eq!(Input::parse("   "), None);
    }

    #[test]
    fn add_validates_key_and_address() {
        let key = "00".repeat(32);
        assert!(matches!(
            Input::parse(&format!("add bob 10.0.0.2:4443 {key}")),
            Some(Input::Add { .. })
        ));
        assert!(matches!(Input::parse(&format!("add bob nowhere {key}")), Some(Input::Invalid(_))));
        assert!(matches!(Input::parse("add bob 10.0.0.2:4443 zz"), Some(Input::Invalid(_))));
    }

    #[test]
    fn offline_takes_a_fingerprint() {
        assert_eq!(
            Input::parse("offline 0123456789abcdef"),
            Some(Input::Offline { fingerprint: Fingerprint::parse("0123456789abcdef").unwrap() })
        );
        assert!(matches!(Input::parse("offline bob"), Some(Input::Invalid(_))));
    }

    #[test]
    fn send_without_text_is_rejected() {
        assert!(matches!(Input::parse("send bob"), Some(Input::Invalid(_))));
    }
}
