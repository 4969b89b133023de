//! Relay configuration types.

pub mod config;

pub use config::{HeartbeatPolicy, RelayConfig};
