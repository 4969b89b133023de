//! LabGate relay — entry point.
//!
//! This binary accepts WebSocket connections from desktop and mobile peers
//! and coordinates the pairing protocol between them: session registration,
//! credential-result forwarding, location collection, and the geofence
//! admission decision.
//!
//! # Usage
//!
//! ```text
//! labgate-relay [OPTIONS]
//!
//! Options:
//!   --bind <ADDR>            Listener bind address [default: 0.0.0.0]
//!   --port <PORT>            Listener port [default: 4100]
//!   --geofence-file <PATH>   TOML file seeding the geofence registry
//!   --heartbeat-window <SECS>  Expected heartbeat interval [default: 30]
//!   --sweep-interval <SECS>    Idle sweeper cadence [default: 5]
//! ```
//!
//! Environment variable overrides: `LABGATE_BIND`, `LABGATE_PORT`,
//! `LABGATE_GEOFENCE_FILE`, `LABGATE_HEARTBEAT_WINDOW`,
//! `LABGATE_SWEEP_INTERVAL`. CLI arguments take precedence.
//!
//! Login-attempt facts are drained from the registry's event stream and
//! logged; persisting them is the external datastore collaborator's job.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use labgate_core::StaticGeofenceRegistry;
use labgate_relay::domain::config::{HeartbeatPolicy, RelayConfig};
use labgate_relay::{run_server, SessionRegistry};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// LabGate pairing relay.
#[derive(Debug, Parser)]
#[command(
    name = "labgate-relay",
    about = "Pairing session relay for LabGate cross-device authentication",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket listener to.
    #[arg(long, default_value = "0.0.0.0", env = "LABGATE_BIND")]
    bind: String,

    /// TCP port for the WebSocket listener.
    #[arg(long, default_value_t = 4100, env = "LABGATE_PORT")]
    port: u16,

    /// TOML file seeding the geofence registry. Without one the relay starts
    /// with an empty registry and every location check fails as
    /// `no_geofence_configured`.
    #[arg(long, env = "LABGATE_GEOFENCE_FILE")]
    geofence_file: Option<PathBuf>,

    /// Expected heartbeat interval in seconds; connections silent for two
    /// windows are forcibly closed.
    #[arg(long, default_value_t = 30, env = "LABGATE_HEARTBEAT_WINDOW")]
    heartbeat_window: u64,

    /// Idle sweeper cadence in seconds.
    #[arg(long, default_value_t = 5, env = "LABGATE_SWEEP_INTERVAL")]
    sweep_interval: u64,
}

impl Cli {
    /// Converts parsed arguments into a [`RelayConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if `--bind` is not a valid IP address.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let bind_addr: SocketAddr = format!("{}:{}", self.bind, self.port)
            .parse()
            .with_context(|| format!("invalid bind address: '{}:{}'", self.bind, self.port))?;

        Ok(RelayConfig {
            bind_addr,
            heartbeat: HeartbeatPolicy {
                idle_window: Duration::from_secs(self.heartbeat_window),
                ..HeartbeatPolicy::default()
            },
            sweep_interval: Duration::from_secs(self.sweep_interval),
            geofence_file: self.geofence_file,
        })
    }
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
    let config = cli.into_relay_config()?;

    let geofences = load_geofences(&config)?;
    let (registry, mut attempts) = SessionRegistry::new(Arc::new(geofences), config.heartbeat);
    let registry = Arc::new(registry);

    info!("labgate-relay starting on {}", config.bind_addr);

    // Login-attempt facts: the protocol produces them; persistence belongs
    // to the external datastore. Here they are surfaced as structured logs.
    tokio::spawn(async move {
        while let Some(fact) = attempts.recv().await {
            info!(
                user = %fact.user_identifier,
                outcome = ?fact.outcome,
                distance_meters = ?fact.distance_meters,
                "login attempt"
            );
        }
    });

    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C — initiating graceful shutdown");
                running_signal.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, registry, running).await?;

    info!("labgate-relay stopped");
    Ok(())
}

/// Loads the geofence registry from the configured TOML file, or starts
/// empty.
fn load_geofences(config: &RelayConfig) -> anyhow::Result<StaticGeofenceRegistry> {
    match &config.geofence_file {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read geofence file {}", path.display()))?;
            let registry = StaticGeofenceRegistry::from_toml_str(&raw)
                .with_context(|| format!("failed to parse geofence file {}", path.display()))?;
            info!("loaded {} geofence(s) from {}", registry.len(), path.display());
            Ok(registry)
        }
        None => {
            warn!("no geofence file configured; every location check will be denied");
            Ok(StaticGeofenceRegistry::new())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["labgate-relay"]);
        assert_eq!(cli.port, 4100);
        assert_eq!(cli.bind, "0.0.0.0");
        assert_eq!(cli.heartbeat_window, 30);
        assert_eq!(cli.sweep_interval, 5);
        assert!(cli.geofence_file.is_none());
    }

    #[test]
    fn test_cli_overrides_flow_into_config() {
        let cli = Cli::parse_from([
            "labgate-relay",
            "--bind",
            "127.0.0.1",
            "--port",
            "9100",
            "--heartbeat-window",
            "10",
        ]);
        let config = cli.into_relay_config().unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:9100");
        assert_eq!(config.heartbeat.idle_window, Duration::from_secs(10));
        // The missed-window allowance is policy, not CLI.
        assert_eq!(config.heartbeat.missed_windows, 2);
    }

    #[test]
    fn test_cli_invalid_bind_address_is_rejected() {
        let cli = Cli::parse_from(["labgate-relay", "--bind", "not.an.ip"]);
        assert!(cli.into_relay_config().is_err());
    }

    #[test]
    fn test_load_geofences_defaults_to_empty_registry() {
        let config = RelayConfig::default();
        let registry = load_geofences(&config).unwrap();
        assert!(registry.is_empty());
    }
}
