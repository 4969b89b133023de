//! Desktop infrastructure: the relay WebSocket client and the location
//! source.

pub mod location;
pub mod relay_conn;

pub use location::FixedLocationProvider;
pub use relay_conn::{connect_with_retry, RelayConnError, RelaySession};
