//! # labgate-core
//!
//! Shared library for LabGate containing the relay wire protocol, geo math,
//! geofence evaluation, the location throttle cache, and the session data
//! model.
//!
//! This crate is used by the relay and by both peer applications (desktop and
//! mobile). It has zero dependencies on sockets, timers, or OS APIs.
//!
//! # Architecture overview
//!
//! LabGate is a cross-device geofenced authentication system: a desktop
//! browser session and a mobile device jointly prove possession of a
//! biometric credential and physical presence inside a radius around a
//! registered facility, coordinated through a relay that neither peer
//! controls end to end.
//!
//! This crate (`labgate-core`) is the shared foundation. It defines:
//!
//! - **`protocol`** – The JSON messages that travel between the peers and the
//!   relay over WebSocket, as direction-specific tagged enums.
//!
//! - **`domain`** – Pure business logic with no I/O: haversine distance,
//!   geofence admission, the 15 m re-verification throttle, and the session
//!   state ladder with its forward-only transition rules.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `labgate_core::GeofenceSpec` instead of the full module path.
pub use domain::error::{CredentialError, LocationError, RelayError};
pub use domain::geo::{
    bearing_degrees, distance_meters, AccuracyGrade, Coordinate, GeoError, LocationProvider,
    LocationSample, EARTH_RADIUS_METERS,
};
pub use domain::geofence::{
    evaluate, GeofenceDecision, GeofenceError, GeofenceRegistry, GeofenceSpec,
    StaticGeofenceRegistry,
};
pub use domain::session::{
    AttemptOutcome, Connection, ConnectionId, LoginAttempt, PeerRole, Session, SessionId,
    SessionMode, SessionState,
};
pub use domain::retry::RetryPolicy;
pub use domain::throttle::{LocationThrottleCache, REVERIFY_THRESHOLD_METERS};
pub use domain::unix_millis;
pub use protocol::deeplink::{DeepLinkError, PairingLink};
pub use protocol::messages::{ClientToRelayMsg, RelayToClientMsg};
