//! Parley relay binary.
//!
//! # Usage
//!
//! ```bash
//! parley-relay --bind 0.0.0.0:7777
//!
//! # Faster expiry for a small test network
//! parley-relay --sweep-interval-secs 5 --inactivity-timeout-secs 15
//! ```

use std::time::Duration;

use clap::Parser;
use parley_relay::{RelayConfig, RelayServer};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Parley rendezvous relay
#[derive(Parser, Debug)]
#[command(name = "parley-relay")]
#[command(about = "Forwards Parley frames between clients behind NAT")]
#[command(version)]
struct Args {
    /// Address to bind to
    #[arg(short, long, default_value = "0.0.0.0:7777")]
    bind: String,

    /// Seconds between sweeps for idle registrations
    #[arg(long, default_value = "30")]
    sweep_interval_secs: u64,

    /// Seconds of silence after which a client is forgotten
    #[arg(long, default_value = "60")]
    inactivity_timeout_secs: u64,

    /// Maximum registered clients
    #[arg(long, default_value = "10000")]
    max_registrations: usize,

    /// Maximum datagrams handled concurrently
    #[arg(long, default_value = "1024")]
    max_in_flight: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    tracing::info!("Parley relay starting");
    tracing::info!("Binding to {}", args.bind);

    let config = RelayConfig {
        bind_address: args.bind,
        sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        inactivity_timeout: Duration::from_secs(args.inactivity_timeout_secs),
        max_registrations: args.max_registrations,
        max_in_flight: args.max_in_flight,
    };

    let server = RelayServer::bind(config).await?;
    server.run().await?;

    Ok(())
}
