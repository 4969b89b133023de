//! LabGate desktop peer — entry point.
//!
//! Opens a pairing session against the relay, prints the pairing deep link
//! for the mobile device (QR rendering is the embedding page's job), drives
//! the login flow to a decision, and on admission runs the continuous
//! re-verification loop until Ctrl+C or geofence exit.
//!
//! # Usage
//!
//! ```text
//! labgate-desktop --user admin@lab.example [OPTIONS]
//!
//! Options:
//!   --relay-url <URL>         Relay WebSocket URL [default: ws://127.0.0.1:4100]
//!   --mobile-auth-url <URL>   Base URL for the pairing link
//!   --mode <login|registration>   [default: login]
//!   --no-location             Skip the geofence gate for this session
//!   --latitude/--longitude    Device coordinate for post-login re-verification
//!   --retries <N>             Relay connection attempts [default: 5]
//! ```
//!
//! Environment overrides: `LABGATE_RELAY_URL`, `LABGATE_MOBILE_AUTH_URL`.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use labgate_core::{RetryPolicy, SessionMode, StaticGeofenceRegistry};
use labgate_desktop::application::state::new_pairing_link;
use labgate_desktop::infrastructure::{connect_with_retry, FixedLocationProvider};
use labgate_desktop::{run_login_flow, DesktopConfig, FlowOutcome, ReverifyConfig, ReverifyEvent, ReverifyLoop};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LabGate desktop peer.
#[derive(Debug, Parser)]
#[command(
    name = "labgate-desktop",
    about = "Desktop peer for LabGate cross-device geofenced authentication",
    version
)]
struct Cli {
    /// Account email/handle to authenticate.
    #[arg(long)]
    user: String,

    /// Relay WebSocket URL.
    #[arg(long, default_value = "ws://127.0.0.1:4100", env = "LABGATE_RELAY_URL")]
    relay_url: String,

    /// Base URL the pairing link is rendered against.
    #[arg(
        long,
        default_value = "https://gate.lab.example/mobile-auth",
        env = "LABGATE_MOBILE_AUTH_URL"
    )]
    mobile_auth_url: String,

    /// Session mode.
    #[arg(long, default_value = "login")]
    mode: SessionMode,

    /// Skip the geofence gate for this session.
    #[arg(long)]
    no_location: bool,

    /// Device latitude for post-login re-verification.
    #[arg(long, requires = "longitude")]
    latitude: Option<f64>,

    /// Device longitude for post-login re-verification.
    #[arg(long, requires = "latitude")]
    longitude: Option<f64>,

    /// Geofence TOML file for the re-verification check (same format as the
    /// relay's).
    #[arg(long)]
    geofence_file: Option<std::path::PathBuf>,

    /// Relay connection attempts before giving up.
    #[arg(long, default_value_t = 5)]
    retries: u32,
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
    let config = DesktopConfig {
        relay_url: cli.relay_url.clone(),
        mobile_auth_url: cli.mobile_auth_url.clone(),
        retry: RetryPolicy {
            max_attempts: cli.retries,
            ..RetryPolicy::default()
        },
        ..DesktopConfig::default()
    };

    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received Ctrl+C — shutting down");
            running_signal.store(false, Ordering::Relaxed);
        }
    });

    let require_location = !cli.no_location;
    let session_id = uuid::Uuid::new_v4().to_string();
    let link = new_pairing_link(&session_id, &cli.user, cli.mode, require_location);

    // The pairing link is what the operator scans on the mobile device.
    println!("Pair your mobile device:\n  {}", link.to_url(&config.mobile_auth_url));

    let session = connect_with_retry(
        &config.relay_url,
        &config.retry,
        config.heartbeat_interval,
        Arc::clone(&running),
    )
    .await
    .context("relay connection failed")?;

    let outcome = run_login_flow(&link, session.incoming, session.outgoing).await;

    match outcome {
        FlowOutcome::Completed {
            distance_meters: Some(d),
        } => println!("Login admitted ({d:.0} m from the facility)"),
        FlowOutcome::Completed {
            distance_meters: None,
        } => println!("Login admitted"),
        FlowOutcome::Failed {
            reason,
            distance_meters,
        } => {
            match distance_meters {
                Some(d) => println!("Login failed: {reason} ({d:.0} m from the facility)"),
                None => println!("Login failed: {reason}"),
            }
            println!("Retry with a fresh session by running the command again.");
            return Ok(());
        }
    }

    // Post-login: keep re-verifying presence while the session lives.
    let (Some(latitude), Some(longitude)) = (cli.latitude, cli.longitude) else {
        info!("no device coordinate configured; skipping re-verification loop");
        return Ok(());
    };
    let geofences = match &cli.geofence_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read geofence file {}", path.display()))?;
            StaticGeofenceRegistry::from_toml_str(&raw)
                .with_context(|| format!("failed to parse geofence file {}", path.display()))?
        }
        None => {
            warn!("no geofence file; re-verification will degrade gracefully");
            StaticGeofenceRegistry::new()
        }
    };
    let provider = FixedLocationProvider::new(latitude, longitude, 10.0)
        .context("invalid device coordinate")?;

    let reverify = Arc::new(ReverifyLoop::new(
        cli.user.clone(),
        ReverifyConfig::default(),
        Arc::new(provider),
        Arc::new(geofences),
    ));
    let mut events = reverify.spawn(Arc::clone(&running));

    while let Some(event) = events.recv().await {
        match event {
            ReverifyEvent::Verified { decision, reused } => {
                info!(
                    distance_meters = decision.distance_meters,
                    reused, "presence verified"
                );
            }
            ReverifyEvent::LeftGeofence { decision } => {
                println!(
                    "You left the facility geofence ({:.0} m away); session terminated.",
                    decision.distance_meters
                );
                break;
            }
            ReverifyEvent::Degraded { reason } => {
                warn!(reason, "re-verification degraded; session kept");
            }
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    info!("labgate-desktop stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
