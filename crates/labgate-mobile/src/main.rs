//! LabGate mobile peer — entry point.
//!
//! Takes the pairing deep link (scanned from the desktop's QR code), parses
//! it, connects to the relay, runs the credential ceremony, and reports
//! location if and when the relay asks for it.
//!
//! # Usage
//!
//! ```text
//! labgate-mobile --link '<pairing-url>' [OPTIONS]
//!
//! Options:
//!   --relay-url <URL>       Relay WebSocket URL [default: ws://127.0.0.1:4100]
//!   --latitude/--longitude  Device coordinate [default: 0/0]
//!   --accuracy <METERS>     Reported GPS accuracy [default: 10]
//!   --deny-location         Simulate a denied location permission
//!   --enrolled              Pre-bind a credential (for login-mode runs)
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use labgate_core::PairingLink;
use labgate_mobile::infrastructure::{connect, DeviceLocation};
use labgate_mobile::{
    run_mobile_flow, ChallengeHandler, InMemoryCredentialDirectory, MobileOutcome,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LabGate mobile peer.
#[derive(Debug, Parser)]
#[command(
    name = "labgate-mobile",
    about = "Mobile peer for LabGate cross-device geofenced authentication",
    version
)]
struct Cli {
    /// The pairing deep link rendered by the desktop.
    #[arg(long)]
    link: String,

    /// Relay WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:4100", env = "LABGATE_RELAY_URL")]
    relay_url: String,

    /// Device latitude.
    #[arg(long, default_value_t = 0.0)]
    latitude: f64,

    /// Device longitude.
    #[arg(long, default_value_t = 0.0)]
    longitude: f64,

    /// Reported GPS accuracy in meters.
    #[arg(long, default_value_t = 10.0)]
    accuracy: f64,

    /// Simulate the user denying the location permission.
    #[arg(long)]
    deny_location: bool,

    /// Pre-bind a credential for the account (login-mode runs need one).
    #[arg(long)]
    enrolled: bool,

    /// Device location read timeout in seconds.
    #[arg(long, default_value_t = 15)]
    capture_timeout: u64,

    /// Heartbeat interval towards the relay in seconds.
    #[arg(long, default_value_t = 20)]
    heartbeat_interval: u64,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let link = PairingLink::parse(&cli.link).context("invalid pairing link")?;
    info!(
        session_id = %link.session_id,
        user = %link.user_identifier,
        mode = %link.mode,
        require_location = link.require_location,
        "pairing link parsed"
    );

    let directory = InMemoryCredentialDirectory::new();
    if cli.enrolled {
        directory.bind(link.user_identifier.clone());
    }
    let handler = ChallengeHandler::new(Arc::new(directory));

    let mut device = DeviceLocation::new(cli.latitude, cli.longitude, cli.accuracy)
        .context("invalid device coordinate")?;
    if cli.deny_location {
        device = device.denying_permission();
    }

    let relay = connect(
        &cli.relay_url,
        Duration::from_secs(cli.heartbeat_interval),
    )
    .await
    .context("relay connection failed")?;

    let outcome = run_mobile_flow(
        &link,
        &handler,
        Arc::new(device),
        Duration::from_secs(cli.capture_timeout),
        relay.incoming,
        relay.outgoing,
    )
    .await;

    match outcome {
        MobileOutcome::Completed { admitted: true } => {
            println!("Authentication complete — you can close this window.");
        }
        MobileOutcome::Completed { admitted: false } => {
            println!("Authentication finished, but you are outside the facility geofence.");
        }
        MobileOutcome::Failed(reason) => {
            println!("Authentication failed: {reason:?}");
            println!("Scan a fresh pairing link to retry.");
        }
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
