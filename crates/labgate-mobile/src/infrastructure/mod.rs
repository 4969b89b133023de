//! Mobile infrastructure: the relay WebSocket client and the device
//! geolocation stand-in.

pub mod geolocation;
pub mod relay_conn;

pub use geolocation::DeviceLocation;
pub use relay_conn::{connect, MobileLink, RelayConnError};
