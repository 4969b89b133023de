//! Desktop peer configuration.

use std::time::Duration;

use labgate_core::RetryPolicy;

/// All runtime configuration for the desktop peer.
#[derive(Debug, Clone)]
pub struct DesktopConfig {
    /// WebSocket URL of the relay, e.g. `ws://127.0.0.1:4100`.
    pub relay_url: String,

    /// Base URL the pairing deep link is rendered against (the page the
    /// mobile device opens).
    pub mobile_auth_url: String,

    /// How often the peer heartbeats the relay. Must stay well inside the
    /// relay's 30 s idle window.
    pub heartbeat_interval: Duration,

    /// Reconnect schedule towards the relay.
    pub retry: RetryPolicy,
}

impl Default for DesktopConfig {
    fn default() -> Self {
        Self {
            relay_url: "ws://127.0.0.1:4100".to_string(),
            mobile_auth_url: "https://gate.lab.example/mobile-auth".to_string(),
            heartbeat_interval: Duration::from_secs(20),
            retry: RetryPolicy::default(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_relay_url_is_local() {
        let cfg = DesktopConfig::default();
        assert_eq!(cfg.relay_url, "ws://127.0.0.1:4100");
    }

    #[test]
    fn test_heartbeat_fits_inside_relay_idle_window() {
        let cfg = DesktopConfig::default();
        assert!(cfg.heartbeat_interval < Duration::from_secs(30));
    }
}
