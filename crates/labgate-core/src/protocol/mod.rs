//! The JSON wire protocol spoken between the peers and the relay, plus the
//! pairing deep-link contract.

pub mod deeplink;
pub mod messages;

pub use deeplink::{DeepLinkError, PairingLink};
pub use messages::{ClientToRelayMsg, RelayToClientMsg};
