//! Relay infrastructure: the WebSocket accept loop and the idle sweeper.

pub mod ws_server;

pub use ws_server::run_server;
