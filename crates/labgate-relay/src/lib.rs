//! # labgate-relay
//!
//! The pairing session relay: the only multi-party shared-mutable-state
//! component in LabGate. It maintains one record per pairing session, holds
//! at most one desktop and one mobile connection per session, routes protocol
//! messages between them, and runs the geofence admission check when the
//! desktop delegates it.
//!
//! Layout:
//! - `domain` – relay configuration and the heartbeat/idle policy.
//! - `application` – the [`SessionRegistry`](application::SessionRegistry):
//!   all session bookkeeping and routing, testable without sockets.
//! - `infrastructure` – the WebSocket accept loop and the idle sweeper.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::registry::SessionRegistry;
pub use domain::config::{HeartbeatPolicy, RelayConfig};
pub use infrastructure::ws_server::run_server;
