//! Relay configuration.
//!
//! [`RelayConfig`] is the single source of truth for runtime settings. It is
//! built from CLI arguments in production and from `Default` in tests; the
//! domain never reads environment variables itself.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Heartbeat and idle-expiry policy shared by the registry and the sweeper.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatPolicy {
    /// A connection is expected to heartbeat at least once per window.
    pub idle_window: Duration,
    /// Windows a connection may miss before it is forcibly closed.
    pub missed_windows: u32,
    /// Sessions with no activity for this long are closed and reaped.
    pub session_idle_timeout: Duration,
}

impl HeartbeatPolicy {
    /// Total silence tolerated before a connection is closed.
    pub fn max_silence(&self) -> Duration {
        self.idle_window * self.missed_windows
    }
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self {
            idle_window: Duration::from_secs(30),
            missed_windows: 2,
            session_idle_timeout: Duration::from_secs(300),
        }
    }
}

/// All runtime configuration for the relay binary.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Address and port the WebSocket listener binds to.
    ///
    /// `0.0.0.0` accepts connections from any interface; set `127.0.0.1` to
    /// accept only local connections.
    pub bind_addr: SocketAddr,

    /// Heartbeat and idle-expiry policy.
    pub heartbeat: HeartbeatPolicy,

    /// How often the sweeper scans for idle connections and sessions.
    pub sweep_interval: Duration,

    /// Optional TOML file seeding the geofence registry at startup.
    pub geofence_file: Option<PathBuf>,
}

impl Default for RelayConfig {
    /// Defaults suitable for local development without external
    /// configuration.
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:4100".parse().unwrap(),
            heartbeat: HeartbeatPolicy::default(),
            sweep_interval: Duration::from_secs(5),
            geofence_file: None,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
